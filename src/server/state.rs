use std::sync::Arc;

use crate::backup::BackupGenerator;
use crate::runtime_config::ConfigService;

use super::config::ApiConfig;

/// Shared application state for the HTTP server.
///
/// Both long-lived services are constructed once at startup; handlers only
/// ever see them through this struct. Overrides and the config cache live
/// inside `runtime` and are lost on restart by design.
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub runtime: ConfigService,
    pub backups: BackupGenerator,
}
