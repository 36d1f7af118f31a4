use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::runtime_config::{env_first, ConfigError, OverrideRequest};

use super::auth::{bearer_token, check_admin_token, unauthorized};
use super::metrics::metrics;
use super::state::AppState;

pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Resolve the environment key from the `x-env` header or `env` query
/// parameter, defaulting to production.
fn resolve_environment(headers: &HeaderMap, query: &HashMap<String, String>) -> String {
    headers
        .get("x-env")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| {
            query
                .get("env")
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// Collapse a caller-supplied environment name to a fixed label set so
/// arbitrary `x-env` values cannot grow metric cardinality without bound.
fn metric_environment(environment: &str) -> &'static str {
    match environment {
        "production" => "production",
        "staging" => "staging",
        "development" => "development",
        _ => "other",
    }
}

// ── GET /client-runtime-config (+ /api alias) ────────────────

pub async fn handle_client_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let environment = resolve_environment(&headers, &query);

    match state.runtime.get_or_resolve(&environment) {
        Ok((document, cached)) => {
            let m = metrics();
            m.config_requests
                .with_label_values(&[
                    metric_environment(&environment),
                    if cached { "hit" } else { "miss" },
                ])
                .inc();
            m.cached_environments
                .set(state.runtime.cached_environments() as i64);

            (
                StatusCode::OK,
                [
                    ("x-content-type-options", "nosniff"),
                    ("x-frame-options", "DENY"),
                    ("x-xss-protection", "1; mode=block"),
                    ("cache-control", "private, max-age=300"),
                ],
                Json(serde_json::json!({
                    "data": document,
                    "cached": cached,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "environment": environment,
                })),
            )
                .into_response()
        }
        Err(e @ ConfigError::Unavailable(_)) => {
            metrics()
                .config_errors
                .with_label_values(&[metric_environment(&environment)])
                .inc();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "config_unavailable",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "internal",
                "message": e.to_string(),
            })),
        )
            .into_response(),
    }
}

// ── POST /admin/env-sync ─────────────────────────────────────

pub async fn handle_env_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OverrideRequest>,
) -> Response {
    let token = bearer_token(&headers);
    if !check_admin_token(&state.config.auth, token.as_deref()) {
        return unauthorized();
    }

    match state.runtime.apply_override(&request) {
        Ok(applied) => {
            metrics().override_total.with_label_values(&["ok"]).inc();
            println!("Override applied: {}", applied.join(", "));
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "overrides": applied,
                })),
            )
                .into_response()
        }
        Err(e @ ConfigError::InvalidOverride) => {
            metrics().override_total.with_label_values(&["error"]).inc();
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "message": e.to_string(),
            })),
        )
            .into_response(),
    }
}

// ── Liveness and diagnostics ─────────────────────────────────

pub async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "cached_environments": state.runtime.cached_environments(),
    }))
}

pub async fn handle_test() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "VidGro runtime API is reachable",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Reports which configuration env vars are present (booleans only; values
/// never leave the process).
pub async fn handle_test_env(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "environment": env_first(&["APP_ENV"]).unwrap_or_else(|| "development".to_string()),
        "vars": {
            "mobileSupabaseUrl": env_first(&["MOBILE_SUPABASE_URL"]).is_some(),
            "supabaseUrl": env_first(&["SUPABASE_URL"]).is_some(),
            "mobileSupabaseAnonKey": env_first(&["MOBILE_SUPABASE_ANON_KEY"]).is_some(),
            "supabaseAnonKey": env_first(&["SUPABASE_ANON_KEY"]).is_some(),
            "serviceRoleKey": env_first(&["SUPABASE_SERVICE_ROLE_KEY"]).is_some(),
            "backupBucket": env_first(&["BACKUP_BUCKET"]).is_some(),
        },
        "storageConfigured": state.backups.storage_configured(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_environment_collapses_unknown_values() {
        assert_eq!(metric_environment("production"), "production");
        assert_eq!(metric_environment("staging"), "staging");
        assert_eq!(metric_environment("development"), "development");
        assert_eq!(metric_environment("prod-eu-west-1"), "other");
        assert_eq!(metric_environment("<script>"), "other");
    }

    #[test]
    fn environment_prefers_header_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-env", "staging".parse().unwrap());
        let mut query = HashMap::new();
        query.insert("env".to_string(), "development".to_string());
        assert_eq!(resolve_environment(&headers, &query), "staging");
        assert_eq!(
            resolve_environment(&HeaderMap::new(), &HashMap::new()),
            DEFAULT_ENVIRONMENT
        );
    }
}
