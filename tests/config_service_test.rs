use std::env;
use std::sync::Mutex;

use vidgro_runtime_api::runtime_config::{
    ConfigError, ConfigService, OverrideRequest, CACHE_TTL_MS,
};
use vidgro_runtime_api::server::config::ApiConfig;

// Resolution reads the process environment, so every test that touches env
// vars serializes on this lock and restores a clean slate first.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const SUPABASE_VARS: &[&str] = &[
    "MOBILE_SUPABASE_URL",
    "SUPABASE_URL",
    "MOBILE_SUPABASE_ANON_KEY",
    "SUPABASE_ANON_KEY",
];

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    for var in SUPABASE_VARS {
        env::remove_var(var);
    }
    guard
}

#[test]
fn falls_back_to_literal_defaults_when_nothing_is_configured() {
    let _guard = lock_env();

    let service = ConfigService::new(true);
    let doc = service.resolve_config("production").unwrap();

    // The deliberate "always serve something" policy: a misconfigured
    // deployment still gets a working (demo) credential pair.
    assert_eq!(doc.supabase.url, "https://vidgro-demo.supabase.co");
    assert!(!doc.supabase.anon_key.is_empty());
}

#[test]
fn fails_closed_when_insecure_defaults_are_disabled() {
    let _guard = lock_env();

    let service = ConfigService::new(false);
    let result = service.resolve_config("production");
    assert!(matches!(result, Err(ConfigError::Unavailable(_))));
}

#[test]
fn mobile_env_var_wins_over_generic() {
    let _guard = lock_env();
    env::set_var("MOBILE_SUPABASE_URL", "https://mobile.supabase.co");
    env::set_var("SUPABASE_URL", "https://generic.supabase.co");
    env::set_var("SUPABASE_ANON_KEY", "generic-key");

    let service = ConfigService::new(false);
    let doc = service.resolve_config("production").unwrap();
    assert_eq!(doc.supabase.url, "https://mobile.supabase.co");
    assert_eq!(doc.supabase.anon_key, "generic-key");

    for var in SUPABASE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn override_wins_over_environment_variables() {
    let _guard = lock_env();
    env::set_var("SUPABASE_URL", "https://env.supabase.co");
    env::set_var("SUPABASE_ANON_KEY", "env-key");

    let service = ConfigService::new(false);
    service
        .apply_override(&OverrideRequest {
            supabase_url: Some("https://override.supabase.co".to_string()),
            supabase_anon_key: Some("override-key".to_string()),
            ..Default::default()
        })
        .unwrap();

    let doc = service.resolve_config("production").unwrap();
    assert_eq!(doc.supabase.url, "https://override.supabase.co");
    assert_eq!(doc.supabase.anon_key, "override-key");

    for var in SUPABASE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn cached_document_reflects_override_only_after_invalidation() {
    let _guard = lock_env();
    env::set_var("SUPABASE_URL", "https://env.supabase.co");
    env::set_var("SUPABASE_ANON_KEY", "env-key");

    let service = ConfigService::new(false);
    let (doc, cached) = service.get_or_resolve_at("production", 0).unwrap();
    assert!(!cached);
    assert_eq!(doc.supabase.url, "https://env.supabase.co");

    service
        .apply_override(&OverrideRequest {
            mobile_supabase_url: Some("https://override.supabase.co".to_string()),
            mobile_supabase_anon_key: Some("override-key".to_string()),
            ..Default::default()
        })
        .unwrap();

    // Still inside the original TTL window, but the override cleared the
    // cache, so this is a fresh resolve with the new credentials.
    let (doc, cached) = service
        .get_or_resolve_at("production", CACHE_TTL_MS / 2)
        .unwrap();
    assert!(!cached);
    assert_eq!(doc.supabase.url, "https://override.supabase.co");

    for var in SUPABASE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn resolve_never_returns_partial_credentials() {
    let _guard = lock_env();
    // URL present, key absent, no fallback allowed: the whole document
    // must fail rather than ship an empty anon key.
    env::set_var("SUPABASE_URL", "https://env.supabase.co");

    let service = ConfigService::new(false);
    assert!(matches!(
        service.resolve_config("production"),
        Err(ConfigError::Unavailable(_))
    ));

    env::remove_var("SUPABASE_URL");
}

#[test]
fn env_overrides_win_over_config_file_values() {
    let _guard = lock_env();

    let dir = env::temp_dir().join("vidgro-api-config-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("vidgro-api.toml");
    std::fs::write(
        &path,
        "[backup]\nmax_rows_per_table = 500\nbucket = \"from-file\"\n",
    )
    .unwrap();

    env::remove_var("BACKUP_BUCKET");
    env::remove_var("BACKUP_TABLES");
    env::set_var("BACKUP_MAX_ROWS_PER_TABLE", "750");
    let mut config = ApiConfig::load(path.to_str().unwrap());
    config.apply_env_overrides();
    env::remove_var("BACKUP_MAX_ROWS_PER_TABLE");

    assert_eq!(config.backup.max_rows_per_table, 750);
    // Untouched file values survive the env pass.
    assert_eq!(config.backup.bucket, "from-file");
}

#[test]
fn admin_token_env_override_parses_comma_separated_list() {
    let _guard = lock_env();

    env::set_var("ADMIN_TOKENS", "alpha, beta,,gamma ");
    let mut config = ApiConfig::default();
    config.apply_env_overrides();
    env::remove_var("ADMIN_TOKENS");

    assert_eq!(config.auth.admin_tokens, vec!["alpha", "beta", "gamma"]);
}
