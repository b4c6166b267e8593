/*
 * Responsibility
 * - v1 URL structure
 * - /health, provider-facing outcome callback, browser-facing mutations
 * - The CSRF guard wraps ONLY the browser-facing routes; provider webhooks
 *   are server-to-server and carry no cookies
 */
use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::middleware::csrf;
use crate::state::AppState;

use crate::api::v1::handlers::{
    assignments::delete_assignment, health::health, outcomes::post_outcome,
};

pub fn routes(csrf_enforcement: bool) -> Router<AppState> {
    let browser = csrf::apply(
        Router::new().route("/assignments/{assignment_id}", delete(delete_assignment)),
        csrf_enforcement,
    );

    Router::new()
        .route("/health", get(health))
        .route("/courses/{course_id}/outcomes", post(post_outcome))
        .merge(browser)
}
