//! Double-submit CSRF guard for browser-originated mutation routes.
//!
//! Responsibility:
//! - Compare the `csrf_token` cookie against the `x-csrf-token` request
//!   header on mutating methods; both present, non-empty and exactly equal,
//!   or the request is forbidden
//! - No server-side token storage; the cookie is the state
//!
//! Cookie issuance is the security-header middleware's job (it mints the
//! token on any response missing it, so a later mutation already has one to
//! echo). The whole guard is a no-op unless CSRF_ENFORCEMENT is set: some
//! deployments rely solely on same-site cookies plus an origin check.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, header},
    middleware::{self, Next},
    response::Response,
};
use tracing::warn;

use crate::error::AppError;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Double-submit comparison. Empty strings do not count as present.
pub fn check(cookie: Option<&str>, header: Option<&str>) -> bool {
    match (cookie, header) {
        (Some(cookie), Some(header)) => !cookie.is_empty() && cookie == header,
        _ => false,
    }
}

/// Read one cookie value out of the `Cookie` request header.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Apply the guard to a set of browser-facing mutation routes.
pub fn apply<S>(router: Router<S>, enabled: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(enabled, csrf_middleware))
}

async fn csrf_middleware(
    State(enabled): State<bool>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !enabled || is_safe(req.method()) {
        return Ok(next.run(req).await);
    }

    let cookie = cookie_value(req.headers(), CSRF_COOKIE);
    let header = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok());

    if !check(cookie, header) {
        warn!(
            cookie_present = cookie.is_some(),
            header_present = header.is_some(),
            "csrf double-submit mismatch"
        );
        return Err(AppError::forbidden("CSRF_MISMATCH"));
    }

    Ok(next.run(req).await)
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
