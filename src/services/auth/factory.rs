//! Wiring for the authorization gate.
//!
//! Responsibility:
//! - Assemble the gate from configuration: HTTP key fetcher, JWKS cache,
//!   provider JWT verifier, runtime-token verifier

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::config::Config;
use crate::error::AppError;
use crate::repos::provider_repo::CourseProviderStore;
use crate::services::auth::gate::AuthorizationGate;
use crate::services::auth::jwks::{HttpKeyFetcher, JwksCache};
use crate::services::auth::provider_jwt::ProviderJwtVerifier;
use crate::services::auth::rate_limit::RateLimiter;
use crate::services::auth::runtime_token::RuntimeTokenVerifier;

pub fn build_authorization_gate(
    config: &Config,
    providers: Arc<dyn CourseProviderStore>,
    limiter: Arc<RateLimiter>,
) -> Result<Arc<AuthorizationGate>, AppError> {
    let fetcher = HttpKeyFetcher::new(Duration::from_secs(config.jwks_fetch_timeout_seconds))
        .map_err(|err| {
            error!(error = %err, "failed to build JWKS HTTP client");
            AppError::Internal
        })?;

    let cache = Arc::new(JwksCache::new(
        Arc::new(fetcher),
        Duration::from_secs(config.jwks_cache_ttl_seconds),
    ));

    let provider_jwt = ProviderJwtVerifier::new(cache, config.token_leeway_seconds);
    let runtime_tokens =
        RuntimeTokenVerifier::new(&config.runtime_token_secret, config.token_leeway_seconds);

    Ok(Arc::new(AuthorizationGate::new(
        providers,
        provider_jwt,
        runtime_tokens,
        limiter,
        config.webhook_rate_limit,
        config.rate_limit_window_ms,
        config.provider_verification,
        config.outcome_test_mode,
    )))
}
