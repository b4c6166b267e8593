/*
 * Responsibility
 * - Load environment configuration (DATABASE_URL, allow-lists, auth settings,
 *   feature flags, rate-limit thresholds)
 * - Validate settings (missing values fail startup)
 * - Production safety guard: refuse to serve under insecure configuration
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
    /// Production safety violation: serving would mean running with a
    /// security-relevant misconfiguration, so startup must abort.
    Insecure(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
            ConfigError::Insecure(what) => {
                write!(f, "insecure production configuration: {}", what)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Platform-side asymmetric key material (public/private/key-id).
///
/// The gate itself only verifies; this material is what lets the platform
/// participate in provider-facing signed exchanges, so the production guard
/// requires it whenever provider verification is enabled.
#[derive(Clone)]
pub struct ProviderKeyMaterial {
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub key_id: String,
}

impl fmt::Debug for ProviderKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("ProviderKeyMaterial")
            .field("key_id", &self.key_id)
            .finish()
    }
}

pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,

    pub app_env: AppEnv,

    /// Shared by the CORS layer and the CSP `connect-src` directive.
    pub cors_allowed_origins: Vec<String>,
    /// Extra origins the platform is allowed to embed (CSP `frame-src`).
    pub frame_src_allowed_origins: Vec<String>,

    pub runtime_token_secret: String,
    pub token_leeway_seconds: u64,

    pub jwks_cache_ttl_seconds: u64,
    pub jwks_fetch_timeout_seconds: u64,

    pub csrf_enforcement: bool,
    pub embedder_policy: bool,
    pub provider_verification: bool,
    pub outcome_test_mode: bool,

    pub provider_key: Option<ProviderKeyMaterial>,

    pub webhook_rate_limit: u32,
    pub mutation_rate_limit: u32,
    pub rate_limit_window_ms: u64,
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let app_env = AppEnv::from_env();

        let runtime_token_secret = std::env::var("RUNTIME_TOKEN_SECRET")
            .map_err(|_| ConfigError::Missing("RUNTIME_TOKEN_SECRET"))?;
        if runtime_token_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("RUNTIME_TOKEN_SECRET"));
        }

        // Present only when all three parts are set; partially set material is
        // treated as a configuration mistake rather than silently ignored.
        let provider_key = match (
            std::env::var("PROVIDER_KEY_PUBLIC_PEM").ok(),
            std::env::var("PROVIDER_KEY_PRIVATE_PEM").ok(),
            std::env::var("PROVIDER_KEY_ID").ok(),
        ) {
            (Some(public), Some(private), Some(key_id)) => Some(ProviderKeyMaterial {
                public_key_pem: public.replace("\\n", "\n"),
                private_key_pem: private.replace("\\n", "\n"),
                key_id,
            }),
            (None, None, None) => None,
            _ => return Err(ConfigError::Invalid("PROVIDER_KEY_* (all three or none)")),
        };

        Ok(Self {
            addr,
            database_url,
            app_env,
            cors_allowed_origins: env_list("CORS_ALLOWED_ORIGINS"),
            frame_src_allowed_origins: env_list("FRAME_SRC_ALLOWED_ORIGINS"),
            runtime_token_secret,
            token_leeway_seconds: env_u64("TOKEN_LEEWAY_SECONDS", 60),
            jwks_cache_ttl_seconds: env_u64("JWKS_CACHE_TTL_SECONDS", 300),
            jwks_fetch_timeout_seconds: env_u64("JWKS_FETCH_TIMEOUT_SECONDS", 3),
            csrf_enforcement: env_flag("CSRF_ENFORCEMENT"),
            embedder_policy: env_flag("EMBEDDER_POLICY"),
            provider_verification: env_flag("PROVIDER_VERIFICATION"),
            outcome_test_mode: env_flag("OUTCOME_TEST_MODE"),
            provider_key,
            webhook_rate_limit: env_u64("RATE_LIMIT_WEBHOOK", 30) as u32,
            mutation_rate_limit: env_u64("RATE_LIMIT_MUTATION", 10) as u32,
            rate_limit_window_ms: env_u64("RATE_LIMIT_WINDOW_MS", 60_000),
        })
    }

    /// Production safety guard (boot half).
    ///
    /// Runs once before serving. Outside production everything passes; in
    /// production each violation is fatal, never degraded:
    /// - backing store must be Postgres over TLS
    /// - provider verification requires the platform key material
    /// - the outcome test bypass must not be active
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.app_env.is_production() {
            return Ok(());
        }

        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(ConfigError::Insecure("DATABASE_URL: unsupported scheme"));
        }
        let tls_ok = ["sslmode=require", "sslmode=verify-ca", "sslmode=verify-full"]
            .iter()
            .any(|m| self.database_url.contains(m));
        if !tls_ok {
            return Err(ConfigError::Insecure("DATABASE_URL: TLS (sslmode) required"));
        }

        if self.provider_verification && self.provider_key.is_none() {
            return Err(ConfigError::Insecure(
                "PROVIDER_VERIFICATION enabled without PROVIDER_KEY_* material",
            ));
        }

        if self.outcome_test_mode {
            return Err(ConfigError::Insecure("OUTCOME_TEST_MODE active"));
        }

        Ok(())
    }
}
