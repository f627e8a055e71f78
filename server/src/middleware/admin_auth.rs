use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;

use crate::handlers::ApiError;
use crate::state::AppState;

/// Admin gate for mutating routes. The token arrives either as a bearer
/// authorization value or in the `x-admin-token` header. With no token
/// configured every request is refused; there is no fallback credential.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Admin token is not configured" })),
        ));
    };
    match extract_admin_token(headers) {
        Some(token) if token == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        )),
    }
}

fn extract_admin_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_bearer_then_admin_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer  s3cret "),
        );
        assert_eq!(extract_admin_token(&headers).as_deref(), Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-token", HeaderValue::from_static("s3cret"));
        assert_eq!(extract_admin_token(&headers).as_deref(), Some("s3cret"));

        assert_eq!(extract_admin_token(&HeaderMap::new()), None);
    }
}
