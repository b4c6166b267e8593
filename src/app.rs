/*
 * Responsibility
 * - Config load → production safety guard → dependency wiring → Router
 * - Middleware application (http hygiene / CORS / security headers /
 *   test-role override)
 * - Start serving via axum::serve()
 */
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    api,
    config::Config,
    middleware::{cors, http, security_headers, security_headers::HeaderPolicy, test_role},
    repos::provider_repo::PgProviderStore,
    services::auth::{build_authorization_gate, rate_limit::RateLimiter},
    state::AppState,
};

pub async fn run() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("configuration")?;
    // Boot half of the production safety guard: refuse to serve at all
    // rather than serve insecurely.
    config.validate().context("production safety guard")?;

    let state = build_state(&config).await?;
    let app = build_router(&config, state);

    info!(addr = %config.addr, env = ?config.app_env, "listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_state(config: &Config) -> Result<AppState> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("database connection")?;

    let providers = Arc::new(PgProviderStore::new(db.clone()));
    let limiter = Arc::new(RateLimiter::new());
    let gate = build_authorization_gate(config, providers, limiter.clone())
        .map_err(|err| anyhow::anyhow!("authorization gate wiring failed: {err}"))?;

    Ok(AppState {
        db,
        gate,
        limiter,
        mutation_rate_limit: config.mutation_rate_limit,
        rate_limit_window_ms: config.rate_limit_window_ms,
    })
}

fn build_router(config: &Config, state: AppState) -> Router {
    let policy = Arc::new(HeaderPolicy::from_config(config));
    let is_production = config.app_env.is_production();

    let router = Router::new()
        .nest("/api/v1", api::v1::routes(config.csrf_enforcement))
        .with_state(state);

    // Later layers wrap earlier ones, so the http hygiene stack (request id,
    // limits, timeout, tracing) is outermost and sees every request.
    let router = test_role::apply(router, is_production);
    let router = security_headers::apply(router, policy);
    let router = cors::apply(router, config);
    http::apply(router)
}
