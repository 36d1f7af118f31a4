use async_trait::async_trait;
use serde_json::json;

use crate::backup::{BackupSource, Row};

use super::{http_client, trim_base_url};

/// PostgREST-backed [`BackupSource`]. All calls authenticate with the
/// service-role key and go through the project's `/rest/v1` surface; no
/// direct database connection is held.
pub struct SupabaseRest {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseRest {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, String> {
        Ok(Self {
            base_url: trim_base_url(base_url),
            service_key: service_key.to_string(),
            client: http_client()?,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    /// Call a database function through `/rest/v1/rpc/{name}` and return
    /// its textual result. PostgREST wraps scalar text results in a JSON
    /// string; unwrap it when it parses as one.
    async fn rpc(&self, name: &str, body: serde_json::Value) -> Result<String, String> {
        let response = self
            .client
            .post(format!("{}/rest/v1/rpc/{}", self.base_url, name))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("rpc {}: {}", name, e))?;

        if !response.status().is_success() {
            return Err(format!("rpc {} returned {}", name, response.status()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| format!("rpc {}: {}", name, e))?;
        match serde_json::from_str::<String>(&text) {
            Ok(unwrapped) => Ok(unwrapped),
            Err(_) => Ok(text),
        }
    }
}

#[async_trait]
impl BackupSource for SupabaseRest {
    async fn probe_table(&self, table: &str) -> Result<(), String> {
        let response = self
            .get(&format!("/rest/v1/{}?select=*&limit=0", table))
            .send()
            .await
            .map_err(|e| format!("probe {}: {}", table, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("probe {} returned {}", table, response.status()))
        }
    }

    async fn fetch_rows(&self, table: &str, offset: u64, limit: u64) -> Result<Vec<Row>, String> {
        let response = self
            .get(&format!(
                "/rest/v1/{}?select=*&offset={}&limit={}",
                table, offset, limit
            ))
            .send()
            .await
            .map_err(|e| format!("fetch {}: {}", table, e))?;

        if !response.status().is_success() {
            return Err(format!("fetch {} returned {}", table, response.status()));
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| format!("fetch {}: {}", table, e))
    }

    async fn table_ddl(&self, table: &str) -> Result<String, String> {
        self.rpc("get_table_ddl", json!({ "p_table": table })).await
    }

    async fn table_indexes(&self, table: &str) -> Result<String, String> {
        self.rpc("get_table_indexes", json!({ "p_table": table }))
            .await
    }

    async fn table_triggers(&self, table: &str) -> Result<String, String> {
        self.rpc("get_table_triggers", json!({ "p_table": table }))
            .await
    }

    async fn table_policies(&self, table: &str) -> Result<String, String> {
        self.rpc("get_table_policies", json!({ "p_table": table }))
            .await
    }

    async fn function_definitions(&self) -> Result<String, String> {
        self.rpc("get_function_definitions", json!({})).await
    }
}
