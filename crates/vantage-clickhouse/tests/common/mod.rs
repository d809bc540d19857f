#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use vantage_clickhouse::ClickHouseBackend;
use vantage_core::analytics::AnalyticsRequest;
use vantage_core::cache::MemoryCache;
use vantage_core::config::EngineConfig;
use vantage_core::store::{ColumnStore, Query};
use vantage_metadata::{MemoryMetadataStore, Project};

pub const PID: &str = "abcdefghijkl";

/// Column store double: records every query and answers with the canned rows
/// of the first marker contained in the SQL text.
#[derive(Default)]
pub struct RecordingStore {
    responses: Vec<(&'static str, Vec<Value>)>,
    pub seen: Mutex<Vec<Query>>,
    pub executed: Mutex<Vec<Query>>,
    failing: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn respond(mut self, marker: &'static str, rows: Value) -> Self {
        let rows = match rows {
            Value::Array(rows) => rows,
            other => vec![other],
        };
        self.responses.push((marker, rows));
        self
    }

    pub async fn queries(&self) -> Vec<Query> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl ColumnStore for RecordingStore {
    async fn query(&self, query: &Query) -> anyhow::Result<Vec<Value>> {
        self.seen.lock().await.push(query.clone());
        if self.failing {
            anyhow::bail!("ClickHouse error 503 Service Unavailable: overloaded");
        }
        Ok(self
            .responses
            .iter()
            .find(|(marker, _)| query.sql.contains(marker))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, query: &Query) -> anyhow::Result<()> {
        if self.failing {
            anyhow::bail!("ClickHouse error 503 Service Unavailable: overloaded");
        }
        self.executed.lock().await.push(query.clone());
        Ok(())
    }
}

pub fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: "Example".to_string(),
        timezone: None,
        origins: Vec::new(),
        ip_blacklist: Vec::new(),
        bot_protection_level: "basic".to_string(),
        password_protected: false,
    }
}

pub async fn backend_with(store: Arc<RecordingStore>) -> (ClickHouseBackend, MemoryMetadataStore) {
    let metadata = MemoryMetadataStore::new();
    metadata.insert_project(project(PID)).await;
    let backend = ClickHouseBackend::new(
        store,
        Arc::new(MemoryCache::new()),
        Arc::new(metadata.clone()),
        EngineConfig::default(),
    );
    (backend, metadata)
}

pub fn request(period: Option<&str>, from: Option<&str>, to: Option<&str>) -> AnalyticsRequest {
    AnalyticsRequest {
        pid: PID.to_string(),
        period: period.map(str::to_string),
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        ..Default::default()
    }
}
