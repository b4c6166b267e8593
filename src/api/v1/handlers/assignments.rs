/*
 * Responsibility
 * - DELETE /assignments/{assignment_id} (browser-facing destructive mutation)
 * - Runtime token with the delete scope, then a per-user mutation throttle
 * - CSRF double-submit is enforced by route middleware before this runs
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    repos::assignment_repo,
    services::auth::gate::bearer_token,
    state::AppState,
};

const DELETE_SCOPE: &str = "assignments.delete";

pub async fn delete_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthenticated)?;
    let claims = state.gate.verify_runtime_token(token, &[DELETE_SCOPE])?;

    // Throttle per verified subject, not per assignment: one misbehaving
    // client cannot spread deletions across ids to dodge the limit.
    let key = format!("asg:del:{}", claims.subject);
    let decision = state.limiter.check(
        &key,
        state.mutation_rate_limit,
        state.rate_limit_window_ms,
    );
    if !decision.allowed {
        warn!(subject = %claims.subject, "assignment deletion rate limited");
        let now_ms = chrono::Utc::now().timestamp_millis();
        return Err(AppError::RateLimited {
            remaining: decision.remaining,
            reset_at_ms: decision.reset_at_ms,
            retry_after_secs: decision.retry_after_secs(now_ms),
        });
    }

    let deleted = assignment_repo::delete(&state.db, assignment_id).await?;
    if deleted {
        info!(subject = %claims.subject, %assignment_id, "assignment deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound {
            resource: "assignment",
        })
    }
}
