//! Security-related response headers for browser clients.
//!
//! Responsibility:
//! - Content-Security-Policy from a fixed baseline plus configured
//!   `connect-src` / `frame-src` allow-lists, with a per-request
//!   `x-frame-allow` extension so a single route can admit one extra frame
//!   origin without widening global policy
//! - Unconditional hardening headers (clickjacking, MIME sniffing, referrer
//!   leakage, cross-origin isolation, browser feature restrictions)
//! - HSTS only in production; COEP only behind its feature flag
//! - Minting the `csrf_token` cookie when a request arrives without one
//!
//! Allow-lists are parsed and normalized once at boot into a HeaderPolicy,
//! not re-parsed per header field.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, header},
    middleware::{self, Next},
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use url::Url;

use crate::config::Config;
use crate::middleware::csrf::{CSRF_COOKIE, cookie_value};

/// Per-request hint: one extra origin admitted into `frame-src`.
pub const FRAME_ALLOW_HEADER: &str = "x-frame-allow";

/// Precomputed, normalized header policy. Derived from config, never stored.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    connect_src: Vec<String>,
    frame_src: Vec<String>,
    embedder_policy: bool,
    production: bool,
}

impl HeaderPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_src: normalize_origins(&config.cors_allowed_origins),
            frame_src: normalize_origins(&config.frame_src_allowed_origins),
            embedder_policy: config.embedder_policy,
            production: config.app_env.is_production(),
        }
    }

    /// Compose the CSP value for one response.
    pub fn content_security_policy(&self, frame_extra: Option<&str>) -> String {
        let mut connect = String::from("'self'");
        for origin in &self.connect_src {
            connect.push(' ');
            connect.push_str(origin);
        }

        let mut frame = String::from("'self'");
        for origin in &self.frame_src {
            frame.push(' ');
            frame.push_str(origin);
        }
        if let Some(extra) = frame_extra.and_then(normalize_origin) {
            frame.push(' ');
            frame.push_str(&extra);
        }

        format!(
            "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
             img-src 'self' data:; connect-src {connect}; frame-src {frame}; \
             frame-ancestors 'none'; base-uri 'self'; form-action 'self'"
        )
    }
}

/// Apply security headers (and CSRF cookie minting) to all responses.
pub fn apply(router: Router, policy: Arc<HeaderPolicy>) -> Router {
    router.layer(middleware::from_fn_with_state(policy, headers_middleware))
}

async fn headers_middleware(
    State(policy): State<Arc<HeaderPolicy>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let frame_extra = req
        .headers()
        .get(FRAME_ALLOW_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let has_csrf_cookie = cookie_value(req.headers(), CSRF_COOKIE).is_some();

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&policy.content_security_policy(frame_extra.as_deref()))
    {
        headers.insert(HeaderName::from_static("content-security-policy"), value);
    }

    // Fully restrictive framing: this service is never embedded itself, even
    // though it may embed allow-listed provider tools.
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );

    // Some embedded third-party course content is incompatible with COEP,
    // so it stays opt-in.
    if policy.embedder_policy {
        headers.insert(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        );
    }

    // HSTS would break plain-HTTP local development.
    if policy.production {
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    if !has_csrf_cookie {
        if let Ok(value) = HeaderValue::from_str(&csrf_cookie(policy.production)) {
            headers.append(header::SET_COOKIE, value);
        }
    }

    response
}

/// `Set-Cookie` value for a fresh CSRF token. Deliberately not HttpOnly:
/// client code has to read it back into the `x-csrf-token` header.
fn csrf_cookie(secure: bool) -> String {
    let token = mint_csrf_token();
    let mut cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn mint_csrf_token() -> String {
    // 32 bytes of entropy -> URL-safe base64 without padding.
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).expect("getrandom failed");
    URL_SAFE_NO_PAD.encode(bytes)
}

fn normalize_origins(raw: &[String]) -> Vec<String> {
    raw.iter().filter_map(|s| normalize_origin(s)).collect()
}

/// Keep only well-formed http(s) origins; everything else is dropped rather
/// than emitted into a header verbatim.
fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}
