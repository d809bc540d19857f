use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use vantage_core::analytics::AnalyticsRequest;
use vantage_core::cache::KeyValueCache;
use vantage_core::config::EngineConfig;
use vantage_core::error::{EngineError, EngineResult};
use vantage_core::session;
use vantage_core::store::{fetch_rows, ColumnStore};
use vantage_core::timeframe::{
    all_time_bucket, resolve_time_range, utc_to_local, SafeTimezone, TimeRange, TimeframeQuery,
};
use vantage_metadata::{Project, ProjectMetadata};

use crate::client::ClickHouseClient;
use crate::queries::{first_event_query, FirstEventRow};

/// Analytics engine over a ClickHouse-style column store.
///
/// Every collaborator is injected: the store answers queries, the cache holds
/// session bookkeeping and the metadata provider owns projects and saved
/// funnels. The struct is cheap to clone and holds no per-request state.
#[derive(Clone)]
pub struct ClickHouseBackend {
    pub(crate) store: Arc<dyn ColumnStore>,
    pub(crate) cache: Arc<dyn KeyValueCache>,
    pub(crate) metadata: Arc<dyn ProjectMetadata>,
    pub(crate) config: EngineConfig,
}

impl ClickHouseBackend {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        cache: Arc<dyn KeyValueCache>,
        metadata: Arc<dyn ProjectMetadata>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            metadata,
            config,
        }
    }

    /// Backend talking to the ClickHouse server named in `config`.
    pub fn connect(
        config: EngineConfig,
        cache: Arc<dyn KeyValueCache>,
        metadata: Arc<dyn ProjectMetadata>,
    ) -> Self {
        let store = Arc::new(ClickHouseClient::from_config(&config));
        info!(
            url = %config.clickhouse_url,
            database = %config.clickhouse_database,
            "ClickHouse backend configured"
        );
        Self::new(store, cache, metadata, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) async fn project(&self, pid: &str) -> EngineResult<Project> {
        self.metadata
            .get_project(pid)
            .await?
            .ok_or_else(|| EngineError::not_found("Project"))
    }

    /// Request timezone, then the project's, then the configured default.
    pub(crate) fn timezone_for<'a>(
        &'a self,
        request: &'a AnalyticsRequest,
        project: &'a Project,
    ) -> &'a str {
        request
            .timezone
            .as_deref()
            .or(project.timezone.as_deref())
            .unwrap_or(&self.config.default_timezone)
    }

    /// Resolve the request's window. For `all`, the first event recorded in
    /// `table` decides both the bucket and how far back the window reaches.
    pub(crate) async fn resolve_range(
        &self,
        request: &AnalyticsRequest,
        project: &Project,
        table: &'static str,
    ) -> EngineResult<TimeRange> {
        let now = Utc::now();
        let timezone = self.timezone_for(request, project);
        let mut query = TimeframeQuery {
            from: request.from.as_deref(),
            to: request.to.as_deref(),
            period: request.period.as_deref(),
            timezone: Some(timezone),
            time_bucket: request.time_bucket,
            all_time_diff: None,
        };

        if is_all_time(request) {
            let rows: Vec<FirstEventRow> =
                fetch_rows(self.store.as_ref(), &first_event_query(&request.pid, table)).await?;
            match rows.first().and_then(FirstEventRow::parse) {
                Some(first_event) => {
                    let tz = SafeTimezone::parse(Some(timezone)).tz();
                    let (bucket, diff) = all_time_bucket(
                        utc_to_local(tz, first_event),
                        utc_to_local(tz, now.naive_utc()),
                    )?;
                    debug!(
                        pid = %request.pid,
                        bucket = bucket.as_str(),
                        diff,
                        "All-time window sized from first event"
                    );
                    query.time_bucket = Some(bucket);
                    query.all_time_diff = Some(diff);
                }
                None => query.time_bucket = None,
            }
        }

        Ok(resolve_time_range(&query, now)?)
    }

    /// Hash a visit into a session id and report whether it is the session's
    /// first sighting within the configured uniqueness TTL.
    pub async fn track_session(
        &self,
        pid: &str,
        ip: &str,
        user_agent: &str,
    ) -> anyhow::Result<(String, bool)> {
        let cache = self.cache.as_ref();
        let salt = session::session_salt(cache, self.config.salt_ttl()).await?;
        let psid = session::session_hash(pid, ip, user_agent, &salt);
        let unique =
            session::is_unique_session(cache, &psid, self.config.unique_session_ttl()).await?;
        let duration_ttl = self.config.session_duration_ttl();
        session::session_duration(cache, pid, &psid, Utc::now(), duration_ttl).await?;
        Ok((psid, unique))
    }

    /// Mark the session live and return how long it has been running, in
    /// seconds.
    pub async fn heartbeat(&self, pid: &str, psid: &str) -> anyhow::Result<u64> {
        let cache = self.cache.as_ref();
        session::record_heartbeat(cache, pid, psid, self.config.heartbeat_ttl()).await?;
        let duration_ttl = self.config.session_duration_ttl();
        let duration = session::session_duration(cache, pid, psid, Utc::now(), duration_ttl).await?;
        debug!(pid, psid, duration, "Heartbeat recorded");
        Ok(duration)
    }
}

/// `period=all` without an explicit from/to pair.
pub(crate) fn is_all_time(request: &AnalyticsRequest) -> bool {
    let explicit = request.from.is_some() && request.to.is_some();
    !explicit && request.period.as_deref().map(str::trim) == Some("all")
}
