//! Internal token authentication
//!
//! Every `/internal/*` endpoint requires `X-Internal-Token` to equal the
//! configured shared secret. The comparison is constant-time, the rejection
//! body is fixed, and the middleware runs before any handler touches the
//! request body.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use subtle::ConstantTimeEq;

/// Header carrying the shared secret
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Shared auth state for the middleware
#[derive(Clone)]
pub struct AuthState {
    pub internal_token: String,
}

/// Fixed 401 response for a missing or mismatching token
#[derive(Debug)]
pub struct AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "invalid internal token" })),
        )
            .into_response()
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject requests whose token is absent or wrong
pub async fn require_internal_token(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = request
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(token) if constant_time_eq(token, &state.internal_token) => {
            Ok(next.run(request).await)
        }
        _ => {
            metrics::counter!("sploot_auth_failures_total").increment(1);
            tracing::warn!(path = %request.uri().path(), outcome = "auth_failed", "Invalid internal token");
            Err(AuthError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("token", "token"));
        assert!(!constant_time_eq("token", "other"));
        assert!(!constant_time_eq("token", "toke"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }
}
