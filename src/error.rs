/*
 * Responsibility
 * - App-wide AppError taxonomy (unauthenticated / forbidden / rate-limited /
 *   misconfigured / internal)
 * - IntoResponse mapping (HTTP status, JSON error body, throttle headers)
 * - Clients receive minimal detail; internals are logged at the call site
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::repos::error::RepoError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("not found: {resource}")]
    NotFound { resource: &'static str },

    /// No credential supplied (or a credential so broken it cannot be
    /// attributed to anyone).
    #[error("unauthenticated")]
    Unauthenticated,

    /// Credential present but invalid, under-scoped, context-mismatched or
    /// CSRF-mismatched. `code` distinguishes those cases for callers without
    /// leaking verification internals.
    #[error("forbidden: {code}")]
    Forbidden { code: &'static str },

    /// Throttled. Carries enough metadata for `retry-after` and the
    /// `x-rate-limit-*` response headers.
    #[error("rate limited")]
    RateLimited {
        remaining: u32,
        reset_at_ms: i64,
        retry_after_secs: i64,
    },

    /// Production safety violation detected at request time. Intentionally
    /// not recoverable: the request must fail with a 500-class response.
    #[error("misconfigured")]
    Misconfigured,

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str) -> Self {
        Self::Forbidden { code }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, *code, message.clone())
            }
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} not found."),
            ),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "authentication required".into(),
            ),
            AppError::Forbidden { code } => (StatusCode::FORBIDDEN, *code, "forbidden".into()),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many requests".into(),
            ),
            AppError::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MISCONFIGURED",
                "server configuration error".into(),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "internal server error".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        let mut response = (status, Json(body)).into_response();

        if let AppError::RateLimited {
            remaining,
            reset_at_ms,
            retry_after_secs,
        } = self
        {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(RETRY_AFTER, v);
            }
            if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("x-rate-limit-remaining", v);
            }
            if let Ok(v) = HeaderValue::from_str(&reset_at_ms.to_string()) {
                headers.insert("x-rate-limit-reset", v);
            }
        }

        response
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Db(_) => AppError::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_response_carries_throttle_headers() {
        let err = AppError::RateLimited {
            remaining: 0,
            reset_at_ms: 1_700_000_060_000,
            retry_after_secs: 42,
        };
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["x-rate-limit-remaining"], "0");
        assert_eq!(
            response.headers()["x-rate-limit-reset"],
            "1700000060000"
        );
    }

    #[test]
    fn forbidden_keeps_reason_code_only() {
        let response = AppError::forbidden("INSUFFICIENT_SCOPE").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn misconfigured_is_a_500() {
        let response = AppError::Misconfigured.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
