use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long a cached document stays fresh, matching the
/// `Cache-Control: private, max-age=300` the config endpoint sends.
pub const CACHE_TTL_MS: i64 = 300_000;

// Last-resort credentials so a misconfigured deployment still serves a
// working document. Gated by `allow_insecure_defaults`; deployments that
// would rather fail closed turn the gate off.
const FALLBACK_SUPABASE_URL: &str = "https://vidgro-demo.supabase.co";
const FALLBACK_SUPABASE_ANON_KEY: &str =
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.vidgro-demo-anon-key";

// Google sample ad units, safe to serve when no real IDs are configured.
const FALLBACK_ADMOB_APP_ID: &str = "ca-app-pub-3940256099942544~3347511713";
const FALLBACK_ADMOB_BANNER_ID: &str = "ca-app-pub-3940256099942544/6300978111";
const FALLBACK_ADMOB_INTERSTITIAL_ID: &str = "ca-app-pub-3940256099942544/1033173712";
const FALLBACK_ADMOB_REWARDED_ID: &str = "ca-app-pub-3940256099942544/5224354917";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Supabase credentials could not be resolved from any tier.
    /// Surfaced as 503; clients should retry with backoff.
    #[error("supabase credentials could not be resolved for environment '{0}'")]
    Unavailable(String),
    /// Override request missing both required credential fields.
    #[error("override requires a supabase url and anon key")]
    InvalidOverride,
}

// ── Document shape ───────────────────────────────────────────

/// The configuration document delivered to mobile clients.
/// Serialized in camelCase, matching what the apps already parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub supabase: SupabaseSection,
    pub admob: AdmobSection,
    pub features: FeatureSection,
    pub app: AppSection,
    pub security: SecuritySection,
    pub metadata: MetadataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseSection {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmobSection {
    pub app_id: String,
    pub banner_id: String,
    pub interstitial_id: String,
    pub rewarded_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSection {
    pub coins_enabled: bool,
    pub ads_enabled: bool,
    pub vip_enabled: bool,
    pub referrals_enabled: bool,
    pub analytics_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSection {
    pub min_version: String,
    pub force_update: bool,
    pub maintenance_mode: bool,
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySection {
    pub allow_emulators: bool,
    pub allow_rooted: bool,
    pub require_signature_validation: bool,
    pub ad_block_detection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSection {
    pub config_version: String,
    pub last_updated: String,
    pub ttl: u64,
}

// ── Override request ─────────────────────────────────────────

/// Body of POST /admin/env-sync. Each credential accepts a mobile-prefixed
/// and a generic field name; the first non-empty one wins.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub supabase_url: Option<String>,
    pub mobile_supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub mobile_supabase_anon_key: Option<String>,
    pub admob_app_id: Option<String>,
    pub admob_banner_id: Option<String>,
    pub admob_interstitial_id: Option<String>,
    pub admob_rewarded_id: Option<String>,
}

fn first_non_empty(a: Option<&String>, b: Option<&String>) -> Option<String> {
    a.filter(|s| !s.trim().is_empty())
        .or(b.filter(|s| !s.trim().is_empty()))
        .map(|s| s.trim().to_string())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

// ── Service state ────────────────────────────────────────────

#[derive(Debug, Default)]
struct CredentialOverride {
    url: Option<String>,
    anon_key: Option<String>,
}

#[derive(Debug, Default)]
struct AdmobOverride {
    app_id: Option<String>,
    banner_id: Option<String>,
    interstitial_id: Option<String>,
    rewarded_id: Option<String>,
}

struct CacheEntry {
    document: ConfigDocument,
    cached_at_ms: i64,
}

#[derive(Default)]
struct ServiceState {
    credentials: CredentialOverride,
    admob: AdmobOverride,
    cache: HashMap<String, CacheEntry>,
}

/// Resolves, caches, and serves environment-scoped config documents.
///
/// Constructed once at startup and owned by the shared app state. All
/// mutable state (override store, cache) lives behind one mutex; nothing
/// awaits while holding it, so a concurrent override apply and cache fill
/// cannot interleave into re-caching a pre-override document.
pub struct ConfigService {
    allow_insecure_defaults: bool,
    inner: Mutex<ServiceState>,
}

impl ConfigService {
    pub fn new(allow_insecure_defaults: bool) -> Self {
        Self {
            allow_insecure_defaults,
            inner: Mutex::new(ServiceState::default()),
        }
    }

    /// Resolve a fresh document for `environment`, bypassing the cache.
    /// Field resolution order: override store, mobile env var, generic env
    /// var, literal fallback. Fails rather than return a document with
    /// empty Supabase credentials.
    pub fn resolve_config(&self, environment: &str) -> Result<ConfigDocument, ConfigError> {
        let state = self.inner.lock().expect("config service lock poisoned");
        self.build_document(&state, environment)
    }

    /// Cache-read-through resolve. Returns the document plus whether it was
    /// served from cache. The only path client-facing endpoints use.
    pub fn get_or_resolve(
        &self,
        environment: &str,
    ) -> Result<(ConfigDocument, bool), ConfigError> {
        self.get_or_resolve_at(environment, now_ms())
    }

    /// Same as [`get_or_resolve`](Self::get_or_resolve) with an explicit
    /// clock, so cache expiry is testable without sleeping.
    pub fn get_or_resolve_at(
        &self,
        environment: &str,
        now_ms: i64,
    ) -> Result<(ConfigDocument, bool), ConfigError> {
        let mut state = self.inner.lock().expect("config service lock poisoned");

        if let Some(entry) = state.cache.get(environment) {
            if now_ms - entry.cached_at_ms < CACHE_TTL_MS {
                return Ok((entry.document.clone(), true));
            }
        }

        let document = self.build_document(&state, environment)?;
        state.cache.insert(
            environment.to_string(),
            CacheEntry {
                document: document.clone(),
                cached_at_ms: now_ms,
            },
        );
        Ok((document, false))
    }

    /// Apply an admin override. Both credential values are required (either
    /// alias); rejection leaves the store and cache untouched. On success
    /// every cached document is dropped so the next read re-resolves.
    ///
    /// Returns the camelCase names of the fields that were applied.
    pub fn apply_override(
        &self,
        request: &OverrideRequest,
    ) -> Result<Vec<&'static str>, ConfigError> {
        let url = first_non_empty(
            request.mobile_supabase_url.as_ref(),
            request.supabase_url.as_ref(),
        );
        let anon_key = first_non_empty(
            request.mobile_supabase_anon_key.as_ref(),
            request.supabase_anon_key.as_ref(),
        );

        let (Some(url), Some(anon_key)) = (url, anon_key) else {
            return Err(ConfigError::InvalidOverride);
        };

        let mut state = self.inner.lock().expect("config service lock poisoned");
        let mut applied = vec!["supabaseUrl", "supabaseAnonKey"];
        state.credentials.url = Some(url);
        state.credentials.anon_key = Some(anon_key);

        // AdMob IDs ride along on the same endpoint. They land in the
        // service's own override map, not the process environment.
        if let Some(v) = non_empty(&request.admob_app_id) {
            state.admob.app_id = Some(v);
            applied.push("admobAppId");
        }
        if let Some(v) = non_empty(&request.admob_banner_id) {
            state.admob.banner_id = Some(v);
            applied.push("admobBannerId");
        }
        if let Some(v) = non_empty(&request.admob_interstitial_id) {
            state.admob.interstitial_id = Some(v);
            applied.push("admobInterstitialId");
        }
        if let Some(v) = non_empty(&request.admob_rewarded_id) {
            state.admob.rewarded_id = Some(v);
            applied.push("admobRewardedId");
        }

        state.cache.clear();
        Ok(applied)
    }

    /// Number of environments with a cached document (for diagnostics).
    pub fn cached_environments(&self) -> usize {
        self.inner
            .lock()
            .expect("config service lock poisoned")
            .cache
            .len()
    }

    fn build_document(
        &self,
        state: &ServiceState,
        environment: &str,
    ) -> Result<ConfigDocument, ConfigError> {
        let url = state
            .credentials
            .url
            .clone()
            .or_else(|| env_first(&["MOBILE_SUPABASE_URL", "SUPABASE_URL"]))
            .or_else(|| {
                self.allow_insecure_defaults
                    .then(|| FALLBACK_SUPABASE_URL.to_string())
            });
        let anon_key = state
            .credentials
            .anon_key
            .clone()
            .or_else(|| env_first(&["MOBILE_SUPABASE_ANON_KEY", "SUPABASE_ANON_KEY"]))
            .or_else(|| {
                self.allow_insecure_defaults
                    .then(|| FALLBACK_SUPABASE_ANON_KEY.to_string())
            });

        let (Some(url), Some(anon_key)) = (url, anon_key) else {
            return Err(ConfigError::Unavailable(environment.to_string()));
        };

        Ok(ConfigDocument {
            supabase: SupabaseSection { url, anon_key },
            admob: AdmobSection {
                app_id: state
                    .admob
                    .app_id
                    .clone()
                    .unwrap_or_else(|| env_or("ADMOB_APP_ID", FALLBACK_ADMOB_APP_ID)),
                banner_id: state
                    .admob
                    .banner_id
                    .clone()
                    .unwrap_or_else(|| env_or("ADMOB_BANNER_ID", FALLBACK_ADMOB_BANNER_ID)),
                interstitial_id: state.admob.interstitial_id.clone().unwrap_or_else(|| {
                    env_or("ADMOB_INTERSTITIAL_ID", FALLBACK_ADMOB_INTERSTITIAL_ID)
                }),
                rewarded_id: state
                    .admob
                    .rewarded_id
                    .clone()
                    .unwrap_or_else(|| env_or("ADMOB_REWARDED_ID", FALLBACK_ADMOB_REWARDED_ID)),
            },
            features: FeatureSection {
                coins_enabled: env_flag("FEATURE_COINS_ENABLED", true),
                ads_enabled: env_flag("FEATURE_ADS_ENABLED", true),
                vip_enabled: env_flag("FEATURE_VIP_ENABLED", true),
                referrals_enabled: env_flag("FEATURE_REFERRALS_ENABLED", true),
                analytics_enabled: env_flag("FEATURE_ANALYTICS_ENABLED", true),
            },
            app: AppSection {
                min_version: env_or("MIN_APP_VERSION", "1.0.0"),
                force_update: env_flag("FORCE_UPDATE", false),
                maintenance_mode: env_flag("MAINTENANCE_MODE", false),
                api_version: env_or("API_VERSION", "v1"),
            },
            security: SecuritySection {
                allow_emulators: env_flag("ALLOW_EMULATORS", false),
                allow_rooted: env_flag("ALLOW_ROOTED", false),
                require_signature_validation: env_flag("REQUIRE_SIGNATURE_VALIDATION", true),
                ad_block_detection: env_flag("AD_BLOCK_DETECTION", true),
            },
            metadata: MetadataSection {
                config_version: env_or("CONFIG_VERSION", "1.0.0"),
                last_updated: chrono::Utc::now().to_rfc3339(),
                ttl: (CACHE_TTL_MS / 1000) as u64,
            },
        })
    }
}

// ── Environment helpers ──────────────────────────────────────

/// First non-empty value among the given variable names.
pub fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
        .map(|value| value.trim().to_string())
}

fn env_or(name: &str, default: &str) -> String {
    env_first(&[name]).unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str, default: bool) -> bool {
    match env_first(&[name]) {
        Some(value) => matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests pin credentials via overrides first, so they stay
    // deterministic regardless of what env vars the host has set.
    fn service_with_override(url: &str, key: &str) -> ConfigService {
        let service = ConfigService::new(true);
        service
            .apply_override(&OverrideRequest {
                supabase_url: Some(url.to_string()),
                supabase_anon_key: Some(key.to_string()),
                ..Default::default()
            })
            .unwrap();
        service
    }

    #[test]
    fn cache_hit_within_ttl_returns_identical_document() {
        let service = service_with_override("https://a.supabase.co", "key-a");

        let (first, cached_first) = service.get_or_resolve_at("production", 1_000).unwrap();
        let (second, cached_second) = service
            .get_or_resolve_at("production", 1_000 + CACHE_TTL_MS - 1)
            .unwrap();

        assert!(!cached_first);
        assert!(cached_second);
        assert_eq!(first, second);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let service = service_with_override("https://a.supabase.co", "key-a");

        let (_, cached_first) = service.get_or_resolve_at("production", 1_000).unwrap();
        let (_, cached_second) = service
            .get_or_resolve_at("production", 1_000 + CACHE_TTL_MS)
            .unwrap();

        assert!(!cached_first);
        assert!(!cached_second);
    }

    #[test]
    fn environments_are_cached_independently() {
        let service = service_with_override("https://a.supabase.co", "key-a");

        let (_, _) = service.get_or_resolve_at("production", 0).unwrap();
        let (_, cached) = service.get_or_resolve_at("staging", 0).unwrap();
        assert!(!cached);
        assert_eq!(service.cached_environments(), 2);
    }

    #[test]
    fn override_invalidates_every_cached_environment() {
        let service = service_with_override("https://a.supabase.co", "key-a");
        service.get_or_resolve_at("production", 0).unwrap();
        service.get_or_resolve_at("staging", 0).unwrap();

        service
            .apply_override(&OverrideRequest {
                mobile_supabase_url: Some("https://b.supabase.co".to_string()),
                mobile_supabase_anon_key: Some("key-b".to_string()),
                ..Default::default()
            })
            .unwrap();

        let (doc, cached) = service.get_or_resolve_at("production", 1).unwrap();
        assert!(!cached);
        assert_eq!(doc.supabase.url, "https://b.supabase.co");
        assert_eq!(doc.supabase.anon_key, "key-b");
    }

    #[test]
    fn mobile_alias_wins_over_generic() {
        let service = ConfigService::new(true);
        service
            .apply_override(&OverrideRequest {
                supabase_url: Some("https://generic.supabase.co".to_string()),
                mobile_supabase_url: Some("https://mobile.supabase.co".to_string()),
                supabase_anon_key: Some("generic-key".to_string()),
                ..Default::default()
            })
            .unwrap();

        let doc = service.resolve_config("production").unwrap();
        assert_eq!(doc.supabase.url, "https://mobile.supabase.co");
        assert_eq!(doc.supabase.anon_key, "generic-key");
    }

    #[test]
    fn empty_override_is_rejected_without_side_effects() {
        let service = service_with_override("https://a.supabase.co", "key-a");
        service.get_or_resolve_at("production", 0).unwrap();

        let result = service.apply_override(&OverrideRequest {
            supabase_url: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidOverride)));

        // Cache untouched and credentials unchanged.
        let (doc, cached) = service.get_or_resolve_at("production", 1).unwrap();
        assert!(cached);
        assert_eq!(doc.supabase.url, "https://a.supabase.co");
    }

    #[test]
    fn admob_ids_are_overridable_alongside_credentials() {
        let service = ConfigService::new(true);
        let applied = service
            .apply_override(&OverrideRequest {
                supabase_url: Some("https://a.supabase.co".to_string()),
                supabase_anon_key: Some("key-a".to_string()),
                admob_banner_id: Some("ca-app-pub-1/live-banner".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert!(applied.contains(&"admobBannerId"));
        let doc = service.resolve_config("production").unwrap();
        assert_eq!(doc.admob.banner_id, "ca-app-pub-1/live-banner");
    }

    #[test]
    fn document_serializes_in_camel_case() {
        let service = service_with_override("https://a.supabase.co", "key-a");
        let doc = service.resolve_config("production").unwrap();
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["supabase"]["anonKey"], "key-a");
        assert!(json["app"]["minVersion"].is_string());
        assert!(json["security"]["requireSignatureValidation"].is_boolean());
        assert_eq!(json["metadata"]["ttl"], 300);
    }
}
