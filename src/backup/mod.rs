pub mod sqlgen;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use self::sqlgen::{insert_statement, SqlScript};

/// One exported row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Read side of a backup: table probe, schema introspection, row export.
/// Every method is best-effort from the generator's point of view; errors
/// are annotated into the dump rather than propagated.
#[async_trait]
pub trait BackupSource: Send + Sync {
    /// Zero-row probe. `Ok` means the table exists and is readable.
    async fn probe_table(&self, table: &str) -> Result<(), String>;

    async fn fetch_rows(&self, table: &str, offset: u64, limit: u64) -> Result<Vec<Row>, String>;

    async fn table_ddl(&self, table: &str) -> Result<String, String>;
    async fn table_indexes(&self, table: &str) -> Result<String, String>;
    async fn table_triggers(&self, table: &str) -> Result<String, String>;
    async fn table_policies(&self, table: &str) -> Result<String, String>;

    async fn function_definitions(&self) -> Result<String, String>;
}

/// Object listed from the backup bucket. Provider metadata is mapped
/// directly; the bucket listing is the sole source of backup history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: Option<String>,
    pub name: String,
    pub path: String,
    pub size: Option<u64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Write side of a backup: the object-storage bucket.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Create the bucket if a listing capability is available and it is
    /// absent. Backends without listing are tolerated.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), String>;

    async fn upload(&self, bucket: &str, path: &str, content: &[u8]) -> Result<(), String>;

    /// Public URL for the object, when the bucket is public.
    async fn public_url(&self, bucket: &str, path: &str) -> Option<String>;

    /// Time-limited signed URL for private buckets.
    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_secs: u64,
    ) -> Result<String, String>;

    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<StoredObject>, String>;

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), String>;
}

/// Where a generated backup can be retrieved from. The inline variant is
/// always produced; storage is best-effort on top.
#[derive(Debug, Clone)]
pub enum BackupLocation {
    Storage {
        bucket: String,
        path: String,
        public_url: Option<String>,
        signed_url: Option<String>,
    },
    Inline {
        token: String,
    },
}

#[derive(Debug, Clone)]
pub struct BackupResult {
    pub filename: String,
    pub size_bytes: usize,
    pub generated_at: String,
    pub locations: Vec<BackupLocation>,
}

impl BackupResult {
    /// The self-contained base64 token; present on every result.
    pub fn inline_token(&self) -> &str {
        self.locations
            .iter()
            .find_map(|l| match l {
                BackupLocation::Inline { token } => Some(token.as_str()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn storage(&self) -> Option<&BackupLocation> {
        self.locations
            .iter()
            .find(|l| matches!(l, BackupLocation::Storage { .. }))
    }
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub bucket: String,
    /// Fixed candidate table list; only names that answer a zero-row probe
    /// are exported. The generator never enumerates the catalog.
    pub candidate_tables: Vec<String>,
    pub max_rows_per_table: u64,
    pub page_size: u64,
    pub signed_url_ttl_secs: u64,
}

/// On-demand SQL dump generator.
///
/// Both seams are optional: without a source the dump degrades to stub
/// comments, without a store delivery falls back to the inline token only.
pub struct BackupGenerator {
    source: Option<Arc<dyn BackupSource>>,
    store: Option<Arc<dyn BackupStore>>,
    options: BackupOptions,
}

impl BackupGenerator {
    pub fn new(
        source: Option<Arc<dyn BackupSource>>,
        store: Option<Arc<dyn BackupStore>>,
        options: BackupOptions,
    ) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.options.bucket
    }

    /// Build the dump, attempt the storage upload, and always compute the
    /// inline fallback token. Only assembly itself can fail; everything
    /// under it degrades into annotations.
    pub async fn generate(
        &self,
        backup_type: &str,
        custom_name: Option<&str>,
    ) -> Result<BackupResult, String> {
        let sql = self.assemble_sql(backup_type).await;
        let filename = backup_filename(backup_type, custom_name);
        let mut locations = Vec::new();

        if let Some(store) = &self.store {
            match self.upload(store.as_ref(), &filename, sql.as_bytes()).await {
                Ok(location) => locations.push(location),
                Err(e) => eprintln!("Backup: upload of {} failed: {}", filename, e),
            }
        }

        // The inline token makes the backup retrievable even when the
        // storage upload (or the whole store) is unavailable.
        locations.push(BackupLocation::Inline {
            token: URL_SAFE_NO_PAD.encode(sql.as_bytes()),
        });

        Ok(BackupResult {
            filename,
            size_bytes: sql.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            locations,
        })
    }

    async fn assemble_sql(&self, backup_type: &str) -> String {
        let source_label = match &self.source {
            Some(_) => "supabase admin api",
            None => "unavailable",
        };
        let mut script = SqlScript::new(backup_type, source_label);

        let Some(source) = &self.source else {
            script.comment("No administrative database handle is configured.");
            script.comment("Schema and data sections were skipped; set");
            script.comment("SUPABASE_SERVICE_ROLE_KEY to enable full dumps.");
            return script.finish(false);
        };

        script.preamble();

        // Probe the fixed candidate list; only responsive tables are
        // exported.
        let mut present = Vec::new();
        for table in &self.options.candidate_tables {
            match source.probe_table(table).await {
                Ok(()) => present.push(table.clone()),
                Err(e) => {
                    script.comment(&format!("table {} skipped (probe failed: {})", table, e))
                }
            }
        }
        script.comment(&format!(
            "{} of {} candidate tables present",
            present.len(),
            self.options.candidate_tables.len()
        ));
        script.blank();

        for table in &present {
            self.schema_section(source.as_ref(), &mut script, table).await;
        }
        for table in &present {
            self.data_section(source.as_ref(), &mut script, table).await;
        }

        script.section("functions");
        match source.function_definitions().await {
            Ok(defs) if !defs.trim().is_empty() => script.raw(&defs),
            Ok(_) => script.comment("no exported function definitions"),
            Err(e) => script.comment(&format!("function definitions unavailable: {}", e)),
        }

        script.finish(true)
    }

    /// Four independent best-effort introspection calls; each failure is
    /// swallowed into an annotation so partial schema output stays usable.
    async fn schema_section(&self, source: &dyn BackupSource, script: &mut SqlScript, table: &str) {
        script.section(&format!("schema: {}", table));
        let fragments = [
            ("table definition", source.table_ddl(table).await),
            ("indexes", source.table_indexes(table).await),
            ("triggers", source.table_triggers(table).await),
            ("row level security policies", source.table_policies(table).await),
        ];
        for (label, fragment) in fragments {
            match fragment {
                Ok(sql) if !sql.trim().is_empty() => script.raw(&sql),
                Ok(_) => script.comment(&format!("{} for {}: none", label, table)),
                Err(e) => script.comment(&format!("{} for {} unavailable: {}", label, table, e)),
            }
        }
        script.blank();
    }

    /// Paged row export up to the per-table cap. The column list is taken
    /// from the first row and assumed stable for the rest of the export;
    /// schema drift mid-export is not handled.
    async fn data_section(&self, source: &dyn BackupSource, script: &mut SqlScript, table: &str) {
        script.section(&format!("data: {}", table));

        let cap = self.options.max_rows_per_table;
        let mut columns: Option<Vec<String>> = None;
        let mut exported: u64 = 0;

        loop {
            let limit = self.options.page_size.min(cap - exported);
            if limit == 0 {
                script.comment(&format!(
                    "export truncated at {} rows (max_rows_per_table)",
                    cap
                ));
                break;
            }

            let rows = match source.fetch_rows(table, exported, limit).await {
                Ok(rows) => rows,
                Err(e) => {
                    script.comment(&format!("data export for {} failed: {}", table, e));
                    break;
                }
            };
            if rows.is_empty() {
                if exported == 0 {
                    script.comment(&format!("table {} is empty", table));
                }
                break;
            }

            let columns =
                columns.get_or_insert_with(|| rows[0].keys().cloned().collect::<Vec<_>>());
            for row in &rows {
                script.raw(&insert_statement(table, columns, row));
            }

            let fetched = rows.len() as u64;
            exported += fetched;
            if fetched < limit {
                break;
            }
        }
        script.blank();
    }

    async fn upload(
        &self,
        store: &dyn BackupStore,
        filename: &str,
        content: &[u8],
    ) -> Result<BackupLocation, String> {
        let bucket = &self.options.bucket;
        if let Err(e) = store.ensure_bucket(bucket).await {
            eprintln!("Backup: ensure bucket {}: {}", bucket, e);
        }
        store.upload(bucket, filename, content).await?;

        let public_url = store.public_url(bucket, filename).await;
        let signed_url = if public_url.is_none() {
            match store
                .signed_url(bucket, filename, self.options.signed_url_ttl_secs)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    eprintln!("Backup: signed url for {}: {}", filename, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(BackupLocation::Storage {
            bucket: bucket.clone(),
            path: filename.to_string(),
            public_url,
            signed_url,
        })
    }

    /// Bucket listing in descending creation order, capped at 100 entries.
    pub async fn list_backups(&self) -> Result<Vec<StoredObject>, String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "storage is not configured (missing service credentials)".to_string())?;
        store.list(&self.options.bucket, 100).await
    }

    pub async fn delete_backup(&self, path: &str, bucket: Option<&str>) -> Result<(), String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "storage is not configured (missing service credentials)".to_string())?;
        store
            .remove(bucket.unwrap_or(&self.options.bucket), path)
            .await
    }

    /// Whether list/delete can work at all.
    pub fn storage_configured(&self) -> bool {
        self.store.is_some()
    }
}

/// Decode an inline token back into the SQL text it carries.
///
/// Tokens are minted with the URL-safe alphabet so they survive being
/// embedded in a query string; standard-alphabet tokens are still
/// accepted for anything decoded out of band.
pub fn decode_inline_token(token: &str) -> Result<String, String> {
    let token = token.trim();
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .or_else(|_| STANDARD.decode(token))
        .map_err(|e| format!("invalid backup token: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("backup token is not valid utf-8: {}", e))
}

fn backup_filename(backup_type: &str, custom_name: Option<&str>) -> String {
    let base = match custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => sanitize(name),
        None => format!(
            "vidgro-{}-{}",
            sanitize(backup_type),
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ),
    };
    if base.ends_with(".sql") {
        base
    } else {
        format!("{}.sql", base)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_defaults_to_typed_timestamp() {
        let name = backup_filename("manual", None);
        assert!(name.starts_with("vidgro-manual-"));
        assert!(name.ends_with(".sql"));
    }

    #[test]
    fn filename_sanitizes_custom_names() {
        assert_eq!(
            backup_filename("manual", Some("before upgrade #7")),
            "before-upgrade--7.sql"
        );
        assert_eq!(backup_filename("manual", Some("weekly.sql")), "weekly.sql");
    }

    #[test]
    fn inline_token_round_trips() {
        let sql = "INSERT INTO \"t\" (\"a\") VALUES ('x');\n";
        let token = URL_SAFE_NO_PAD.encode(sql.as_bytes());
        assert_eq!(decode_inline_token(&token).unwrap(), sql);
    }

    #[test]
    fn decode_accepts_standard_alphabet_tokens() {
        let sql = "SELECT 1;\n";
        let token = STANDARD.encode(sql.as_bytes());
        assert_eq!(decode_inline_token(&token).unwrap(), sql);
    }

    #[test]
    fn minted_tokens_are_query_string_safe() {
        // "~~~" encodes to "fn5+" under the standard alphabet.
        let sql = "~~~";
        assert!(STANDARD.encode(sql.as_bytes()).contains('+'));
        let token = URL_SAFE_NO_PAD.encode(sql.as_bytes());
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        assert_eq!(decode_inline_token(&token).unwrap(), sql);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_inline_token("not base64!!").is_err());
    }
}
