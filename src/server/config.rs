use std::env;

use serde::Deserialize;

/// Top-level vidgro-api.toml configuration
#[derive(Debug, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Bearer tokens accepted on admin endpoints. Empty list disables auth
    /// (single-operator deployments).
    #[serde(default)]
    pub admin_tokens: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// The fixed probe list. The generator only ever touches these names.
    #[serde(default = "default_candidate_tables")]
    pub candidate_tables: Vec<String>,
    #[serde(default = "default_max_rows_per_table")]
    pub max_rows_per_table: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Wall-clock budget for one backup run.
    #[serde(default = "default_backup_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Gates the literal fallback Supabase credentials. On by default so a
    /// misconfigured environment still serves a document; turn off to fail
    /// closed instead.
    #[serde(default = "default_allow_insecure")]
    pub allow_insecure_defaults: bool,
}

// ── Default value functions ──────────────────────────

fn default_port() -> u16 {
    8080
}

fn default_hostname() -> String {
    "0.0.0.0".to_string()
}

fn default_bucket() -> String {
    "database-backups".to_string()
}

fn default_candidate_tables() -> Vec<String> {
    [
        "profiles",
        "videos",
        "video_views",
        "coin_transactions",
        "vip_subscriptions",
        "referrals",
        "support_tickets",
        "notifications",
        "admin_settings",
        "runtime_config_audit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_rows_per_table() -> u64 {
    2000
}

fn default_page_size() -> u64 {
    1000
}

fn default_backup_timeout() -> u64 {
    120
}

fn default_signed_url_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_allow_insecure() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            hostname: default_hostname(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            candidate_tables: default_candidate_tables(),
            max_rows_per_table: default_max_rows_per_table(),
            page_size: default_page_size(),
            timeout_secs: default_backup_timeout(),
            signed_url_ttl_secs: default_signed_url_ttl(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            allow_insecure_defaults: default_allow_insecure(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file doesn't exist or cannot be parsed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: failed to parse {}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.server.port = port;
            }
        }

        // ADMIN_TOKENS — comma-separated
        if let Ok(val) = env::var("ADMIN_TOKENS") {
            self.auth.admin_tokens = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = env::var("BACKUP_BUCKET") {
            if !val.trim().is_empty() {
                self.backup.bucket = val.trim().to_string();
            }
        }

        // BACKUP_TABLES — comma-separated candidate list
        if let Ok(val) = env::var("BACKUP_TABLES") {
            let tables: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !tables.is_empty() {
                self.backup.candidate_tables = tables;
            }
        }

        if let Ok(val) = env::var("BACKUP_MAX_ROWS_PER_TABLE") {
            if let Ok(cap) = val.parse::<u64>() {
                if cap > 0 {
                    self.backup.max_rows_per_table = cap;
                }
            }
        }

        if let Ok(val) = env::var("ALLOW_INSECURE_DEFAULTS") {
            match val.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.runtime.allow_insecure_defaults = true,
                "0" | "false" | "no" | "off" => self.runtime.allow_insecure_defaults = false,
                other => eprintln!("Warning: unknown ALLOW_INSECURE_DEFAULTS value: {}", other),
            }
        }
    }
}
