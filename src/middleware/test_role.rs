//! Development-only role override.
//!
//! Responsibility:
//! - In non-production environments, lift the `x-test-role` request header
//!   into a request extension so handlers can exercise role-dependent paths
//!   without minting real tokens
//! - In production, treat the header's presence as a deployment fault and
//!   refuse the request outright rather than silently ignoring it
//!
//! A silently ignored override header in production would mask a client
//! misconfiguration, so it fails loudly instead.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};
use tracing::warn;

use crate::error::AppError;

pub const TEST_ROLE_HEADER: &str = "x-test-role";

/// Role injected by the override header. Only ever present outside production.
#[derive(Debug, Clone)]
pub struct TestRole(pub String);

/// Apply the test-role override (or its production rejection) to all routes.
pub fn apply(router: Router, is_production: bool) -> Router {
    router.layer(middleware::from_fn_with_state(
        is_production,
        test_role_middleware,
    ))
}

async fn test_role_middleware(
    State(is_production): State<bool>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let role = req
        .headers()
        .get(TEST_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(role) = role {
        if is_production {
            warn!(role = %role, "test-role override header received in production");
            return Err(AppError::Misconfigured);
        }
        req.extensions_mut().insert(TestRole(role));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn echo_role(req: Request<Body>) -> String {
        req.extensions()
            .get::<TestRole>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| "none".to_string())
    }

    fn app(is_production: bool) -> Router {
        apply(Router::new().route("/", get(echo_role)), is_production)
    }

    #[tokio::test]
    async fn non_production_injects_extension() {
        let res = app(false)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(TEST_ROLE_HEADER, "instructor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"instructor");
    }

    #[tokio::test]
    async fn production_rejects_the_header() {
        let res = app(true)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(TEST_ROLE_HEADER, "instructor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn absent_header_is_a_no_op_everywhere() {
        for is_production in [false, true] {
            let res = app(is_production)
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(res.status(), StatusCode::OK);
            let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
            assert_eq!(&body[..], b"none");
        }
    }
}
