//! Admin PIN check.
//!
//! Implements constant-time comparison to mitigate timing attacks.

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, ErrorDetails, ErrorResponse};

/// Header name for the admin PIN.
pub const ADMIN_PIN_HEADER: &str = "x-admin-pin";

/// Middleware that only lets requests carrying the admin PIN through.
pub async fn admin_pin_layer(expected_pin: String, request: Request, next: Next) -> Response {
    if has_admin_pin(request.headers(), &expected_pin) {
        next.run(request).await
    } else {
        unauthorized_response("Missing or invalid admin PIN")
    }
}

/// Whether the headers carry the admin PIN, either in `x-admin-pin` or as a bearer token.
pub fn has_admin_pin(headers: &HeaderMap, expected: &str) -> bool {
    let provided = headers
        .get(ADMIN_PIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    match provided {
        Some(pin) => pin_matches(pin, expected),
        None => false,
    }
}

/// Perform constant-time string comparison.
pub fn pin_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Create an unauthorized response.
pub fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_pin_matches() {
        assert!(pin_matches("1234", "1234"));
        assert!(!pin_matches("1235", "1234"));
        assert!(!pin_matches("12345", "1234"));
        assert!(!pin_matches("", "1234"));
    }

    #[test]
    fn test_pin_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(!has_admin_pin(&headers, "1234"));

        headers.insert(ADMIN_PIN_HEADER, HeaderValue::from_static("1234"));
        assert!(has_admin_pin(&headers, "1234"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer 1234"));
        assert!(has_admin_pin(&headers, "1234"));
        assert!(!has_admin_pin(&headers, "9999"));
    }
}
