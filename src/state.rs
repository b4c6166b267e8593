/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Clone-cheap by construction (PgPool and services are Arc inside)
 */
use std::sync::Arc;

use sqlx::PgPool;

use crate::services::auth::AuthorizationGate;
use crate::services::auth::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub gate: Arc<AuthorizationGate>,
    pub limiter: Arc<RateLimiter>,
    pub mutation_rate_limit: u32,
    pub rate_limit_window_ms: u64,
}
