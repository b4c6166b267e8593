//! Authorization gate for provider-facing outcome callbacks.
//!
//! Responsibility:
//! - Rate-limit the callback key once per request, before either trust path
//! - Pick the trust path: provider JWT when the course has a registered
//!   provider with a JWKS URL, first-party runtime token otherwise
//! - Map every verifier/cache failure onto the AppError taxonomy; raw
//!   verification errors never reach the client, only the logs
//!
//! The two paths exist because an integration may be a verified third party
//! (cryptographic trust via its published keys) or a first-party embedded
//! tool (a scoped, revocable token); the gate must not force every
//! integration to stand up a JWKS endpoint.

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use tracing::{info, warn};

use crate::error::AppError;
use crate::repos::provider_repo::CourseProviderStore;
use crate::services::auth::VerifiedClaims;
use crate::services::auth::provider_jwt::{ProviderJwtError, ProviderJwtVerifier};
use crate::services::auth::rate_limit::RateLimiter;
use crate::services::auth::runtime_token::{RuntimeTokenError, RuntimeTokenVerifier};

/// Capability required to post an outcome.
pub const OUTCOME_WRITE_SCOPE: &str = "outcomes.write";

/// Alternate token header for providers that cannot set `Authorization`.
pub const OUTCOME_TOKEN_HEADER: &str = "x-outcome-token";

pub struct AuthorizationGate {
    providers: Arc<dyn CourseProviderStore>,
    provider_jwt: ProviderJwtVerifier,
    runtime_tokens: RuntimeTokenVerifier,
    limiter: Arc<RateLimiter>,
    webhook_rate_limit: u32,
    rate_limit_window_ms: u64,
    provider_verification: bool,
    outcome_test_mode: bool,
}

impl AuthorizationGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Arc<dyn CourseProviderStore>,
        provider_jwt: ProviderJwtVerifier,
        runtime_tokens: RuntimeTokenVerifier,
        limiter: Arc<RateLimiter>,
        webhook_rate_limit: u32,
        rate_limit_window_ms: u64,
        provider_verification: bool,
        outcome_test_mode: bool,
    ) -> Self {
        Self {
            providers,
            provider_jwt,
            runtime_tokens,
            limiter,
            webhook_rate_limit,
            rate_limit_window_ms,
            provider_verification,
            outcome_test_mode,
        }
    }

    /// Decide whether an outcome callback for `course_id` may proceed, and
    /// under which verified identity.
    pub async fn authorize_outcome_callback(
        &self,
        course_id: &str,
        headers: &HeaderMap,
    ) -> Result<VerifiedClaims, AppError> {
        // The throttle runs exactly once per request and takes precedence
        // over both verification paths.
        let key = format!("webhook:{course_id}");
        let decision = self
            .limiter
            .check(&key, self.webhook_rate_limit, self.rate_limit_window_ms);
        if !decision.allowed {
            warn!(course_id, "outcome callback rate limited");
            let now_ms = chrono::Utc::now().timestamp_millis();
            return Err(AppError::RateLimited {
                remaining: decision.remaining,
                reset_at_ms: decision.reset_at_ms,
                retry_after_secs: decision.retry_after_secs(now_ms),
            });
        }

        let provider = self
            .providers
            .get_provider_for_course(course_id)
            .await
            .map_err(|err| {
                warn!(course_id, error = ?err, "provider lookup failed");
                AppError::Internal
            })?;

        let token = bearer_token(headers);

        if self.provider_verification && !self.outcome_test_mode {
            if let Some(provider) = &provider {
                if let Some(jwks_url) = provider.jwks_url.as_deref() {
                    let token = token.ok_or(AppError::Unauthenticated)?;
                    let claims = self
                        .provider_jwt
                        .verify(token, jwks_url, &provider.domain, Some(course_id))
                        .await
                        .map_err(|err| reject_provider_failure(course_id, err))?;

                    info!(
                        course_id,
                        subject = %claims.subject,
                        issuer = %claims.issuer,
                        "outcome callback authorized via provider jwt"
                    );
                    return Ok(claims);
                }
            }
        }

        // No provider-verifiable path: fall back to the first-party scoped
        // token. Missing or unparseable tokens are unauthenticated; a valid
        // but under-scoped token is forbidden.
        let token = token.ok_or(AppError::Unauthenticated)?;
        match self.runtime_tokens.verify(token, &[OUTCOME_WRITE_SCOPE]) {
            Ok(claims) => {
                info!(
                    course_id,
                    subject = %claims.subject,
                    "outcome callback authorized via runtime token"
                );
                Ok(claims)
            }
            Err(RuntimeTokenError::InsufficientScope(scope)) => {
                warn!(course_id, scope, "runtime token under-scoped");
                Err(AppError::forbidden("INSUFFICIENT_SCOPE"))
            }
            Err(err) => {
                warn!(course_id, error = %err, "runtime token rejected");
                Err(AppError::Unauthenticated)
            }
        }
    }

    /// Verify a runtime token for a browser-originated mutation route.
    pub fn verify_runtime_token(
        &self,
        token: &str,
        required_scopes: &[&str],
    ) -> Result<VerifiedClaims, AppError> {
        match self.runtime_tokens.verify(token, required_scopes) {
            Ok(claims) => Ok(claims),
            Err(RuntimeTokenError::InsufficientScope(scope)) => {
                warn!(scope, "runtime token under-scoped");
                Err(AppError::forbidden("INSUFFICIENT_SCOPE"))
            }
            Err(err) => {
                warn!(error = %err, "runtime token rejected");
                Err(AppError::Unauthenticated)
            }
        }
    }
}

fn reject_provider_failure(course_id: &str, err: ProviderJwtError) -> AppError {
    match err {
        ProviderJwtError::ContextMismatch => {
            warn!(course_id, "provider token bound to a different course");
            AppError::forbidden("CONTEXT_MISMATCH")
        }
        ProviderJwtError::Key(err) => {
            // Key endpoint trouble surfaces as a plain forbidden; fetch
            // internals stay in the logs.
            warn!(course_id, error = %err, "provider key resolution failed");
            AppError::forbidden("FORBIDDEN")
        }
        err => {
            warn!(course_id, error = %err, "provider token rejected");
            AppError::forbidden("FORBIDDEN")
        }
    }
}

/// Extract the callback token from `Authorization: Bearer ...` or the
/// provider-specific alternate header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    headers
        .get(OUTCOME_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::provider_repo::{MemoryProviderStore, ProviderRecord};
    use crate::services::auth::jwks::JwksCache;
    use crate::services::auth::jwks::tests::{StaticKeyFetcher, TEST_JWKS};
    use crate::services::auth::provider_jwt::tests::sign_rs256;
    use crate::services::auth::runtime_token::tests::{SECRET, sign_hs256};
    use axum::http::HeaderValue;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    const DOMAIN: &str = "https://provider.example";
    const JWKS_URL: &str = "https://provider.example/.well-known/jwks.json";

    fn provider_with_jwks() -> ProviderRecord {
        ProviderRecord {
            id: Uuid::new_v4(),
            domain: DOMAIN.to_string(),
            jwks_url: Some(JWKS_URL.to_string()),
        }
    }

    struct GateOptions {
        webhook_rate_limit: u32,
        provider_verification: bool,
        outcome_test_mode: bool,
    }

    impl Default for GateOptions {
        fn default() -> Self {
            Self {
                webhook_rate_limit: 100,
                provider_verification: true,
                outcome_test_mode: false,
            }
        }
    }

    fn gate(store: MemoryProviderStore, options: GateOptions) -> AuthorizationGate {
        let cache = Arc::new(JwksCache::new(
            Arc::new(StaticKeyFetcher::new(TEST_JWKS)),
            Duration::from_secs(300),
        ));
        AuthorizationGate::new(
            Arc::new(store),
            ProviderJwtVerifier::new(cache, 60),
            RuntimeTokenVerifier::new(SECRET, 60),
            Arc::new(RateLimiter::new()),
            options.webhook_rate_limit,
            60_000,
            options.provider_verification,
            options.outcome_test_mode,
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn runtime_token(scopes: &[&str]) -> String {
        sign_hs256(&serde_json::json!({
            "sub": "grader-tool",
            "exp": Utc::now().timestamp() as u64 + 600,
            "scopes": scopes,
        }))
    }

    #[tokio::test]
    async fn no_provider_and_empty_scopes_is_forbidden() {
        let gate = gate(MemoryProviderStore::default(), GateOptions::default());
        let headers = bearer(&runtime_token(&[]));

        let err = gate
            .authorize_outcome_callback("course-1", &headers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Forbidden { code: "INSUFFICIENT_SCOPE" }
        ));
    }

    #[tokio::test]
    async fn no_provider_and_write_scope_is_accepted() {
        let gate = gate(MemoryProviderStore::default(), GateOptions::default());
        let headers = bearer(&runtime_token(&["outcomes.write"]));

        let claims = gate
            .authorize_outcome_callback("course-1", &headers)
            .await
            .unwrap();
        assert_eq!(claims.subject, "grader-tool");
    }

    #[tokio::test]
    async fn provider_course_without_token_is_unauthenticated() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let gate = gate(store, GateOptions::default());

        let err = gate
            .authorize_outcome_callback("course-1", &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn provider_jwt_path_accepts_a_valid_token() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let gate = gate(store, GateOptions::default());

        let now = Utc::now().timestamp() as u64;
        let token = sign_rs256(
            "test-key",
            &serde_json::json!({
                "iss": DOMAIN,
                "aud": DOMAIN,
                "sub": "provider-tool-7",
                "exp": now + 600,
                "courseId": "course-1",
            }),
        );

        let claims = gate
            .authorize_outcome_callback("course-1", &bearer(&token))
            .await
            .unwrap();
        assert_eq!(claims.issuer, DOMAIN);
    }

    #[tokio::test]
    async fn provider_jwt_for_other_course_is_context_mismatch() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let gate = gate(store, GateOptions::default());

        let now = Utc::now().timestamp() as u64;
        let token = sign_rs256(
            "test-key",
            &serde_json::json!({
                "iss": DOMAIN,
                "aud": DOMAIN,
                "sub": "provider-tool-7",
                "exp": now + 600,
                "courseId": "course-2",
            }),
        );

        let err = gate
            .authorize_outcome_callback("course-1", &bearer(&token))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Forbidden { code: "CONTEXT_MISMATCH" }
        ));
    }

    #[tokio::test]
    async fn invalid_provider_token_is_forbidden_not_unauthenticated() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let gate = gate(store, GateOptions::default());

        let err = gate
            .authorize_outcome_callback("course-1", &bearer("not.a.jwt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn unreachable_key_endpoint_is_forbidden_not_internal() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let cache = Arc::new(JwksCache::new(
            Arc::new(StaticKeyFetcher::failing()),
            Duration::from_secs(300),
        ));
        let gate = AuthorizationGate::new(
            Arc::new(store),
            ProviderJwtVerifier::new(cache, 60),
            RuntimeTokenVerifier::new(SECRET, 60),
            Arc::new(RateLimiter::new()),
            100,
            60_000,
            true,
            false,
        );

        let now = Utc::now().timestamp() as u64;
        let token = sign_rs256(
            "test-key",
            &serde_json::json!({
                "iss": DOMAIN,
                "aud": DOMAIN,
                "sub": "provider-tool-7",
                "exp": now + 600,
                "courseId": "course-1",
            }),
        );

        let err = gate
            .authorize_outcome_callback("course-1", &bearer(&token))
            .await
            .unwrap_err();
        // Key endpoint trouble stays in the logs; the caller only sees a
        // plain forbidden, never a 401 or a 500.
        assert!(matches!(err, AppError::Forbidden { code: "FORBIDDEN" }));
    }

    #[tokio::test]
    async fn test_mode_falls_back_to_runtime_tokens() {
        let store = MemoryProviderStore::default().with_course("course-1", provider_with_jwks());
        let gate = gate(
            store,
            GateOptions {
                outcome_test_mode: true,
                ..GateOptions::default()
            },
        );
        let headers = bearer(&runtime_token(&["outcomes.write"]));

        assert!(
            gate.authorize_outcome_callback("course-1", &headers)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn third_call_in_window_is_rate_limited() {
        let gate = gate(
            MemoryProviderStore::default(),
            GateOptions {
                webhook_rate_limit: 2,
                ..GateOptions::default()
            },
        );
        let headers = bearer(&runtime_token(&["outcomes.write"]));

        for _ in 0..2 {
            gate.authorize_outcome_callback("course-1", &headers)
                .await
                .unwrap();
        }

        let err = gate
            .authorize_outcome_callback("course-1", &headers)
            .await
            .unwrap_err();
        match err {
            AppError::RateLimited {
                remaining,
                retry_after_secs,
                ..
            } => {
                assert_eq!(remaining, 0);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // Another course is unaffected.
        assert!(
            gate.authorize_outcome_callback("course-2", &headers)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn alternate_header_carries_the_token() {
        let gate = gate(MemoryProviderStore::default(), GateOptions::default());
        let mut headers = HeaderMap::new();
        headers.insert(
            OUTCOME_TOKEN_HEADER,
            HeaderValue::from_str(&runtime_token(&["outcomes.write"])).unwrap(),
        );

        assert!(
            gate.authorize_outcome_callback("course-1", &headers)
                .await
                .is_ok()
        );
    }

    #[test]
    fn bearer_extraction_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwdw=="),
        );
        assert!(bearer_token(&headers).is_none());
    }
}
