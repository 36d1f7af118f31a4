use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::backup::{BackupStore, StoredObject};

use super::{http_client, trim_base_url};

/// Supabase Storage-backed [`BackupStore`], operating on the project's
/// `/storage/v1` surface with the service-role key.
pub struct SupabaseStorage {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BucketInfo {
    name: String,
    #[serde(default)]
    public: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    id: Option<String>,
    name: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    size: Option<u64>,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, String> {
        Ok(Self {
            base_url: trim_base_url(base_url),
            service_key: service_key.to_string(),
            client: http_client()?,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, String> {
        let response = self
            .authed(self.client.get(format!("{}/storage/v1/bucket", self.base_url)))
            .send()
            .await
            .map_err(|e| format!("list buckets: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("list buckets returned {}", response.status()));
        }
        response
            .json::<Vec<BucketInfo>>()
            .await
            .map_err(|e| format!("list buckets: {}", e))
    }

    async fn bucket_is_public(&self, bucket: &str) -> bool {
        let response = self
            .authed(
                self.client
                    .get(format!("{}/storage/v1/bucket/{}", self.base_url, bucket)),
            )
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => r
                .json::<BucketInfo>()
                .await
                .map(|b| b.public)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
impl BackupStore for SupabaseStorage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), String> {
        // Backends without a listing capability are tolerated; the later
        // upload will surface a real problem if there is one.
        let buckets = match self.list_buckets().await {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Storage: bucket listing unavailable: {}", e);
                return Ok(());
            }
        };
        if buckets.iter().any(|b| b.name == bucket) {
            return Ok(());
        }

        let response = self
            .authed(self.client.post(format!("{}/storage/v1/bucket", self.base_url)))
            .json(&json!({ "id": bucket, "name": bucket, "public": false }))
            .send()
            .await
            .map_err(|e| format!("create bucket {}: {}", bucket, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!(
                "create bucket {} returned {}",
                bucket,
                response.status()
            ))
        }
    }

    async fn upload(&self, bucket: &str, path: &str, content: &[u8]) -> Result<(), String> {
        let response = self
            .authed(self.client.post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, bucket, path
            )))
            .header("Content-Type", "application/sql")
            .header("x-upsert", "true")
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| format!("upload {}: {}", path, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("upload {} returned {}", path, response.status()))
        }
    }

    async fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        if self.bucket_is_public(bucket).await {
            Some(format!(
                "{}/storage/v1/object/public/{}/{}",
                self.base_url, bucket, path
            ))
        } else {
            None
        }
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_secs: u64,
    ) -> Result<String, String> {
        #[derive(Deserialize)]
        struct SignResponse {
            #[serde(rename = "signedURL")]
            signed_url: String,
        }

        let response = self
            .authed(self.client.post(format!(
                "{}/storage/v1/object/sign/{}/{}",
                self.base_url, bucket, path
            )))
            .json(&json!({ "expiresIn": expires_secs }))
            .send()
            .await
            .map_err(|e| format!("sign {}: {}", path, e))?;

        if !response.status().is_success() {
            return Err(format!("sign {} returned {}", path, response.status()));
        }

        let signed = response
            .json::<SignResponse>()
            .await
            .map_err(|e| format!("sign {}: {}", path, e))?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<StoredObject>, String> {
        let response = self
            .authed(self.client.post(format!(
                "{}/storage/v1/object/list/{}",
                self.base_url, bucket
            )))
            .json(&json!({
                "prefix": "",
                "limit": limit,
                "sortBy": { "column": "created_at", "order": "desc" },
            }))
            .send()
            .await
            .map_err(|e| format!("list {}: {}", bucket, e))?;

        if !response.status().is_success() {
            return Err(format!("list {} returned {}", bucket, response.status()));
        }

        let entries = response
            .json::<Vec<ObjectEntry>>()
            .await
            .map_err(|e| format!("list {}: {}", bucket, e))?;
        Ok(entries
            .into_iter()
            .map(|e| StoredObject {
                id: e.id,
                path: e.name.clone(),
                name: e.name,
                size: e.metadata.and_then(|m| m.size),
                created_at: e.created_at,
                updated_at: e.updated_at,
            })
            .collect())
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), String> {
        let response = self
            .authed(self.client.delete(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, bucket, path
            )))
            .send()
            .await
            .map_err(|e| format!("delete {}: {}", path, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("delete {} returned {}", path, response.status()))
        }
    }
}
