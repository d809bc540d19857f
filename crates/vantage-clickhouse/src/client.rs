use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use vantage_core::config::EngineConfig;
use vantage_core::store::{ColumnStore, Query};

/// HTTP client for ClickHouse.
///
/// SQL is posted as the request body; every `{name:Type}` placeholder in it
/// is bound through a `param_<name>` query-string entry, so user values never
/// become part of the SQL text.
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

impl ClickHouseClient {
    pub fn new(url: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            &config.clickhouse_url,
            &config.clickhouse_user,
            &config.clickhouse_password,
            &config.clickhouse_database,
        )
    }

    fn request_url(&self, query: &Query, json: bool) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url).context("Invalid ClickHouse URL")?;
        {
            let mut qs = url.query_pairs_mut();
            qs.append_pair("database", &self.database);
            if json {
                qs.append_pair("default_format", "JSON");
                // Keep 64-bit counters as JSON numbers so rows decode as i64.
                qs.append_pair("output_format_json_quote_64bit_integers", "0");
            }
            for (name, value) in query.params.iter() {
                qs.append_pair(&format!("param_{name}"), &value.to_wire());
            }
        }
        Ok(url)
    }

    async fn post(&self, query: &Query, json: bool) -> Result<reqwest::Response> {
        let url = self.request_url(query, json)?;
        debug!(params = query.params.len(), "Sending ClickHouse query");

        let resp = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .body(query.sql.clone())
            .send()
            .await
            .context("ClickHouse HTTP request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("ClickHouse error {status}: {body}");
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl ColumnStore for ClickHouseClient {
    /// Run a SELECT and return the `data` array of the JSON response.
    async fn query(&self, query: &Query) -> Result<Vec<Value>> {
        let resp = self.post(query, true).await?;
        let json: Value = resp
            .json()
            .await
            .context("ClickHouse response parse failed")?;
        Ok(json
            .get("data")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn execute(&self, query: &Query) -> Result<()> {
        self.post(query, false).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use vantage_core::store::QueryParams;

    use super::*;

    #[test]
    fn params_travel_in_the_query_string() {
        let client = ClickHouseClient::new("http://localhost:8123", "default", "", "analytics");
        let query = Query::new(
            "SELECT count() FROM analytics WHERE pid = {pid:FixedString(12)} AND cc = {qf_0_0:String}",
            QueryParams::new().with("pid", "abcdefghijkl").with("qf_0_0", "BG"),
        );
        let url = client.request_url(&query, true).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("param_qf_0_0".to_string(), "BG".to_string())));
        assert!(pairs.contains(&("database".to_string(), "analytics".to_string())));
        assert!(pairs.contains(&("default_format".to_string(), "JSON".to_string())));
        assert!(!query.sql.contains("BG"));
    }
}
