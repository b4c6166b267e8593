pub mod factory;
pub mod gate;
pub mod jwks;
pub mod provider_jwt;
pub mod rate_limit;
pub mod runtime_token;

use std::collections::HashSet;

pub use factory::build_authorization_gate;
pub use gate::AuthorizationGate;

/// Claims produced by successful verification, shared by both trust paths
/// (provider JWT and runtime token).
///
/// This is the only claims type callers ever see; it is never constructed
/// from unverified input.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: Option<String>,
    pub course_id: Option<String>,
    pub user_id: Option<String>,
    pub scopes: HashSet<String>,
    /// Unix timestamp (seconds).
    pub expires_at: u64,
}
