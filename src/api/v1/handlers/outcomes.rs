/*
 * Responsibility
 * - POST /courses/{course_id}/outcomes (provider score callback)
 * - Gate first (rate limit + trust path), then shape validation
 * - Accepted outcomes are logged with the verified subject for audit
 */
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use tracing::info;

use crate::{
    api::v1::dto::outcomes::{OutcomeRequest, OutcomeResponse},
    error::AppError,
    state::AppState,
};

pub async fn post_outcome(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<OutcomeRequest>,
) -> Result<Json<OutcomeResponse>, AppError> {
    let claims = state
        .gate
        .authorize_outcome_callback(&course_id, &headers)
        .await?;

    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_OUTCOME", msg))?;

    info!(
        course_id,
        subject = %claims.subject,
        user_id = %req.user_id,
        score = req.score,
        "outcome accepted"
    );

    Ok(Json(OutcomeResponse { accepted: true }))
}
