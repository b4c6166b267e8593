//! Verification of first-party runtime tokens (shared-secret HS256).
//!
//! This is the fallback trust path for courses without a registered
//! provider: an embedded first-party tool presents a scoped, revocable
//! token instead of standing up a JWKS endpoint. Only HS256 is accepted
//! and the secret is server-controlled, so algorithm confusion does not
//! apply here.

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::Deserialize;
use thiserror::Error;

use crate::services::auth::VerifiedClaims;

#[derive(Debug, Error)]
pub enum RuntimeTokenError {
    /// Unparseable or cryptographically invalid; the gate maps this to an
    /// unauthenticated rejection.
    #[error("runtime token invalid: {0}")]
    Invalid(String),

    #[error("temporal claim invalid: {0}")]
    Temporal(&'static str),

    /// Valid token, insufficient capability; maps to forbidden.
    #[error("missing required scope: {0}")]
    InsufficientScope(String),
}

#[derive(Debug, Deserialize)]
struct RuntimeTokenClaims {
    sub: String,
    exp: u64,

    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    nbf: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,

    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, rename = "courseId")]
    course_id: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

pub struct RuntimeTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_seconds: u64,
}

impl std::fmt::Debug for RuntimeTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the shared secret
        f.debug_struct("RuntimeTokenVerifier")
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl RuntimeTokenVerifier {
    pub fn new(shared_secret: &str, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_seconds;
        validation.validate_aud = false;

        Self {
            decoding_key: DecodingKey::from_secret(shared_secret.as_bytes()),
            validation,
            leeway_seconds,
        }
    }

    /// Verify `token` and require every scope in `required_scopes`.
    pub fn verify(
        &self,
        token: &str,
        required_scopes: &[&str],
    ) -> Result<VerifiedClaims, RuntimeTokenError> {
        let claims =
            jsonwebtoken::decode::<RuntimeTokenClaims>(token, &self.decoding_key, &self.validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => RuntimeTokenError::Temporal("exp"),
                    ErrorKind::ImmatureSignature => RuntimeTokenError::Temporal("nbf"),
                    _ => RuntimeTokenError::Invalid(e.to_string()),
                })?
                .claims;

        let now = Utc::now().timestamp().max(0) as u64;
        if let Some(nbf) = claims.nbf {
            if nbf > now + self.leeway_seconds {
                return Err(RuntimeTokenError::Temporal("nbf"));
            }
        }
        if let Some(iat) = claims.iat {
            if iat > now + self.leeway_seconds {
                return Err(RuntimeTokenError::Temporal("iat"));
            }
        }

        let scopes: HashSet<String> = claims.scopes.into_iter().collect();
        for required in required_scopes {
            if !scopes.contains(*required) {
                return Err(RuntimeTokenError::InsufficientScope(required.to_string()));
            }
        }

        Ok(VerifiedClaims {
            subject: claims.sub,
            issuer: claims.iss.unwrap_or_default(),
            audience: None,
            course_id: claims.course_id,
            user_id: claims.user_id,
            scopes,
            expires_at: claims.exp,
        })
    }
}
