mod auth;
mod backup_routes;
pub mod config;
mod metrics;
mod routes;
mod state;

use std::process;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;

use crate::backup::{BackupGenerator, BackupOptions, BackupSource, BackupStore};
use crate::runtime_config::{env_first, ConfigService};
use crate::supabase::rest::SupabaseRest;
use crate::supabase::storage::SupabaseStorage;

use self::backup_routes::{
    handle_backup_delete, handle_backup_download, handle_backup_list, handle_backup_trigger,
};
use self::config::ApiConfig;
use self::metrics::{handle_metrics, handle_readyz, track_metrics};
use self::routes::{
    handle_client_config, handle_env_sync, handle_health, handle_test, handle_test_env,
};
pub use self::state::AppState;

/// Load layered configuration: TOML file, env overrides, CLI args last.
pub fn load_config(config_path: &str, port_arg: Option<u16>, hostname_arg: Option<String>) -> ApiConfig {
    let mut config = ApiConfig::load(config_path);
    config.apply_env_overrides();
    if let Some(port) = port_arg {
        config.server.port = port;
    }
    if let Some(hostname) = hostname_arg {
        config.server.hostname = hostname;
    }
    config
}

/// Build the backup generator from the environment. Without a service-role
/// key the admin seams stay absent and the generator degrades gracefully.
pub fn build_backup_generator(config: &ApiConfig) -> BackupGenerator {
    let options = BackupOptions {
        bucket: config.backup.bucket.clone(),
        candidate_tables: config.backup.candidate_tables.clone(),
        max_rows_per_table: config.backup.max_rows_per_table,
        page_size: config.backup.page_size,
        signed_url_ttl_secs: config.backup.signed_url_ttl_secs,
    };

    let url = env_first(&["MOBILE_SUPABASE_URL", "SUPABASE_URL"]);
    let service_key = env_first(&["SUPABASE_SERVICE_ROLE_KEY"]);

    let (source, store): (Option<Arc<dyn BackupSource>>, Option<Arc<dyn BackupStore>>) =
        match (url, service_key) {
            (Some(url), Some(key)) => {
                let source = SupabaseRest::new(&url, &key)
                    .map(|s| Arc::new(s) as Arc<dyn BackupSource>);
                let store = SupabaseStorage::new(&url, &key)
                    .map(|s| Arc::new(s) as Arc<dyn BackupStore>);
                if let Err(ref e) = source {
                    eprintln!("Backup: admin client unavailable: {}", e);
                }
                (source.ok(), store.ok())
            }
            _ => {
                eprintln!(
                    "Backup: SUPABASE_SERVICE_ROLE_KEY not set; dumps degrade to inline stubs"
                );
                (None, None)
            }
        };

    BackupGenerator::new(source, store, options)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/client-runtime-config", get(handle_client_config))
        .route("/api/client-runtime-config", get(handle_client_config))
        .route("/admin/env-sync", post(handle_env_sync))
        .route("/api/admin/database-backup", post(handle_backup_trigger))
        .route("/api/admin/database-backup/list", get(handle_backup_list))
        .route(
            "/api/admin/database-backup/delete",
            post(handle_backup_delete),
        )
        .route("/backup", get(handle_backup_download))
        .route("/health", get(handle_health))
        .route("/test", get(handle_test))
        .route("/test-env", get(handle_test_env))
        .route("/metrics", get(handle_metrics))
        .route("/readyz", get(handle_readyz))
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(CompressionLayer::new())
        .with_state(state)
}

pub async fn run_serve(config_path: &str, port_arg: Option<u16>, hostname_arg: Option<String>) {
    let config = load_config(config_path, port_arg, hostname_arg);
    let backups = build_backup_generator(&config);
    let runtime = ConfigService::new(config.runtime.allow_insecure_defaults);

    if config.auth.admin_tokens.is_empty() {
        eprintln!("Warning: no admin tokens configured; admin endpoints are open");
    }

    let addr = format!("{}:{}", config.server.hostname, config.server.port);
    let state = Arc::new(AppState {
        config: Arc::new(config),
        runtime,
        backups,
    });

    let app = build_router(state);

    println!("Serving VidGro runtime API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }

        #[cfg(not(unix))]
        ctrl_c.await.ok();

        println!("Shutdown signal received, finishing in-flight requests...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {}", e);
            process::exit(1);
        });

    println!("Server stopped");
}
