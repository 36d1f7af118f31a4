use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::config::AuthConfig;

/// Check if the request carries a valid admin bearer token.
/// Returns true if no tokens are configured (no-auth mode).
pub fn check_admin_token(auth: &AuthConfig, token: Option<&str>) -> bool {
    if auth.admin_tokens.is_empty() {
        return true;
    }
    let Some(token) = token else { return false };
    auth.admin_tokens.iter().any(|t| t == token)
}

/// Extract bearer token from Authorization header value.
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(|s| s.to_string())
}

/// Return 401 Unauthorized response.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"success": false, "message": "Unauthorized"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_list_allows_everything() {
        let auth = AuthConfig::default();
        assert!(check_admin_token(&auth, None));
        assert!(check_admin_token(&auth, Some("anything")));
    }

    #[test]
    fn configured_tokens_are_enforced() {
        let auth = AuthConfig {
            admin_tokens: vec!["secret-a".to_string(), "secret-b".to_string()],
        };
        assert!(check_admin_token(&auth, Some("secret-b")));
        assert!(!check_admin_token(&auth, Some("wrong")));
        assert!(!check_admin_token(&auth, None));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}
