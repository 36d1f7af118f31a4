use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::backup::{decode_inline_token, BackupLocation};

use super::auth::{bearer_token, check_admin_token, unauthorized};
use super::metrics::metrics;
use super::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub backup_type: Option<String>,
    pub custom_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRequest {
    pub path: Option<String>,
    pub bucket: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub token: Option<String>,
    pub filename: Option<String>,
}

// ── POST /api/admin/database-backup ──────────────────────────

pub async fn handle_backup_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<BackupRequest>>,
) -> Response {
    let token = bearer_token(&headers);
    if !check_admin_token(&state.config.auth, token.as_deref()) {
        return unauthorized();
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let backup_type = request.backup_type.as_deref().unwrap_or("manual");
    let budget = Duration::from_secs(state.config.backup.timeout_secs);

    let start = Instant::now();
    let result = tokio::time::timeout(
        budget,
        state
            .backups
            .generate(backup_type, request.custom_name.as_deref()),
    )
    .await;
    metrics()
        .backup_duration
        .observe(start.elapsed().as_secs_f64());

    let result = match result {
        Ok(r) => r,
        Err(_) => {
            metrics().backup_total.with_label_values(&["timeout"]).inc();
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": format!("backup exceeded the {}s time budget", budget.as_secs()),
                })),
            )
                .into_response();
        }
    };

    match result {
        Ok(backup) => {
            let m = metrics();
            m.backup_total.with_label_values(&["ok"]).inc();
            m.backup_sql_bytes.set(backup.size_bytes as i64);

            let storage = match backup.storage() {
                Some(BackupLocation::Storage {
                    bucket,
                    path,
                    public_url,
                    signed_url,
                }) => {
                    m.backup_upload_total.with_label_values(&["ok"]).inc();
                    serde_json::json!({
                        "bucket": bucket,
                        "uploaded": true,
                        "publicUrl": public_url,
                        "signedUrl": signed_url,
                        "path": path,
                    })
                }
                _ => {
                    m.backup_upload_total.with_label_values(&["skipped"]).inc();
                    serde_json::json!({
                        "bucket": state.backups.bucket(),
                        "uploaded": false,
                        "publicUrl": null,
                        "signedUrl": null,
                        "path": null,
                    })
                }
            };

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "filename": backup.filename,
                    "filePath": format!(
                        "/backup?token={}&filename={}",
                        backup.inline_token(),
                        backup.filename
                    ),
                    "storage": storage,
                    "size": format!("{:.2} KB", backup.size_bytes as f64 / 1024.0),
                    "timestamp": backup.generated_at,
                })),
            )
                .into_response()
        }
        Err(e) => {
            metrics().backup_total.with_label_values(&["error"]).inc();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": e,
                })),
            )
                .into_response()
        }
    }
}

// ── GET /api/admin/database-backup/list ──────────────────────

pub async fn handle_backup_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let token = bearer_token(&headers);
    if !check_admin_token(&state.config.auth, token.as_deref()) {
        return unauthorized();
    }

    if !state.backups.storage_configured() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "message": "storage is not configured (missing service credentials)",
            })),
        )
            .into_response();
    }

    match state.backups.list_backups().await {
        Ok(backups) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "backups": backups,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "message": e,
            })),
        )
            .into_response(),
    }
}

// ── POST /api/admin/database-backup/delete ───────────────────

pub async fn handle_backup_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<DeleteRequest>>,
) -> Response {
    let token = bearer_token(&headers);
    if !check_admin_token(&state.config.auth, token.as_deref()) {
        return unauthorized();
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let Some(path) = request.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "message": "missing required field: path",
            })),
        )
            .into_response();
    };

    if !state.backups.storage_configured() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "message": "storage is not configured (missing service credentials)",
            })),
        )
            .into_response();
    }

    let bucket = request
        .bucket
        .clone()
        .unwrap_or_else(|| state.backups.bucket().to_string());
    match state.backups.delete_backup(path, Some(&bucket)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "path": path,
                "bucket": bucket,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "message": e,
            })),
        )
            .into_response(),
    }
}

// ── GET /backup?token=&filename= ─────────────────────────────

/// Serve a backup embedded in its inline token. This is the delivery path
/// that works even when storage never accepted the upload.
pub async fn handle_backup_download(Query(query): Query<DownloadQuery>) -> Response {
    let Some(token) = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "message": "missing required query parameter: token",
            })),
        )
            .into_response();
    };

    let sql = match decode_inline_token(token) {
        Ok(sql) => sql,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": e,
                })),
            )
                .into_response();
        }
    };

    let filename = query
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("backup.sql");

    (
        StatusCode::OK,
        [
            ("content-type", "application/sql".to_string()),
            (
                "content-disposition",
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        sql,
    )
        .into_response()
}
