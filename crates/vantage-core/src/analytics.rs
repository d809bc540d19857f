//! Analytics engine abstraction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::comparison::PeriodComparison;
use crate::error::{EngineResult, ValidationError};
use crate::flow::UserFlow;
use crate::funnel::FunnelStep;

/// Granularity at which time-series data is grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Minute => "minute",
            TimeBucket::Hour => "hour",
            TimeBucket::Day => "day",
            TimeBucket::Month => "month",
            TimeBucket::Year => "year",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim() {
            "minute" => Ok(TimeBucket::Minute),
            "hour" => Ok(TimeBucket::Hour),
            "day" => Ok(TimeBucket::Day),
            "month" => Ok(TimeBucket::Month),
            "year" => Ok(TimeBucket::Year),
            other => Err(ValidationError::InvalidTimeBucket(other.to_string())),
        }
    }
}

/// Metric family a request aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Traffic,
    CustomEvents,
    Performance,
    Errors,
    Sessions,
}

/// Plain dimension columns accepted for traffic-like streams.
pub const TRAFFIC_COLUMNS: &[&str] = &[
    "host", "cc", "rg", "ct", "pg", "lc", "ref", "dv", "br", "brv", "os", "osv", "so", "me", "ca",
    "te", "co",
];

pub const PERFORMANCE_COLUMNS: &[&str] = &["host", "cc", "rg", "ct", "pg", "dv", "br", "brv"];

pub const ERROR_COLUMNS: &[&str] = &[
    "host", "cc", "rg", "ct", "pg", "lc", "dv", "br", "brv", "os", "osv", "name", "message",
];

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Traffic => "traffic",
            MetricKind::CustomEvents => "custom_events",
            MetricKind::Performance => "performance",
            MetricKind::Errors => "errors",
            MetricKind::Sessions => "sessions",
        }
    }

    /// Plain columns that may be filtered on (and broken down by) for this kind.
    pub fn filter_columns(self) -> &'static [&'static str] {
        match self {
            MetricKind::Traffic | MetricKind::CustomEvents | MetricKind::Sessions => {
                TRAFFIC_COLUMNS
            }
            MetricKind::Performance => PERFORMANCE_COLUMNS,
            MetricKind::Errors => ERROR_COLUMNS,
        }
    }

    pub fn allows_column(self, column: &str) -> bool {
        self.filter_columns().contains(&column)
    }
}

/// Whether a chart series reports per-bucket values or a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Periodical,
    Cumulative,
}

/// Measure applied to performance timing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerfMeasure {
    Average,
    #[default]
    Median,
    P95,
    Quantiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    Active,
    Regressed,
    Resolved,
}

impl ErrorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorStatus::Active => "active",
            ErrorStatus::Regressed => "regressed",
            ErrorStatus::Resolved => "resolved",
        }
    }
}

/// A dashboard request as it arrives from the transport layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub pid: String,
    pub period: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub timezone: Option<String>,
    pub time_bucket: Option<TimeBucket>,
    /// Raw JSON filter list, e.g. `[{"column":"cc","filter":"BG","isExclusive":false}]`.
    pub filters: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default)]
    pub measure: PerfMeasure,
    /// Errors only: include resolved errors in the counts.
    #[serde(default)]
    pub show_resolved: bool,
}

/// Series values for one chart line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesValues {
    Scalar(Vec<f64>),
    /// `[p50, p75, p95]` per bucket.
    Quantiles(Vec<[f64; 3]>),
}

impl SeriesValues {
    pub fn len(&self) -> usize {
        match self {
            SeriesValues::Scalar(values) => values.len(),
            SeriesValues::Quantiles(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Option<&[f64]> {
        match self {
            SeriesValues::Scalar(values) => Some(values),
            SeriesValues::Quantiles(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResult {
    pub kind: MetricKind,
    pub time_bucket: TimeBucket,
    pub mode: RenderMode,
    /// Axis labels the series are aligned to (timezone-shifted).
    pub x: Vec<String>,
    /// The same points rendered in UTC.
    pub x_utc: Vec<String>,
    pub series: BTreeMap<String, SeriesValues>,
    pub applied_filters: Vec<crate::filters::FilterClause>,
    pub custom_event_filter_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub name: String,
    pub count: i64,
}

/// Column name → entries sorted by count, descending.
pub type Breakdown = BTreeMap<String, Vec<BreakdownEntry>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorListOptions {
    #[serde(default)]
    pub show_resolved: bool,
    #[serde(default = "default_take")]
    pub take: u32,
    #[serde(default)]
    pub skip: u32,
}

fn default_take() -> u32 {
    30
}

impl Default for ErrorListOptions {
    fn default() -> Self {
        Self {
            show_resolved: false,
            take: default_take(),
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorListing {
    pub eid: String,
    pub name: String,
    pub message: String,
    pub filename: Option<String>,
    pub count: i64,
    pub last_seen: String,
    pub status: ErrorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetaRow {
    pub key: String,
    pub value: String,
    pub count: i64,
}

/// The operations the engine exposes to a transport layer.
#[async_trait::async_trait]
pub trait AnalyticsEngine: Send + Sync + 'static {
    async fn build_chart(
        &self,
        request: &AnalyticsRequest,
        kind: MetricKind,
        options: ChartOptions,
    ) -> EngineResult<ChartResult>;

    async fn compute_funnel(
        &self,
        request: &AnalyticsRequest,
        steps: &[String],
    ) -> EngineResult<Vec<FunnelStep>>;

    /// Same as [`AnalyticsEngine::compute_funnel`] for a funnel saved on the project.
    async fn compute_saved_funnel(
        &self,
        request: &AnalyticsRequest,
        funnel_id: &str,
    ) -> EngineResult<Vec<FunnelStep>>;

    async fn compute_user_flow(&self, request: &AnalyticsRequest) -> EngineResult<UserFlow>;

    /// `request.pid` is ignored; every id in `pids` is summarised.
    async fn compute_summary(
        &self,
        pids: &[String],
        request: &AnalyticsRequest,
    ) -> EngineResult<BTreeMap<String, PeriodComparison>>;

    async fn compute_breakdown(
        &self,
        request: &AnalyticsRequest,
        kind: MetricKind,
        columns: Option<&[String]>,
    ) -> EngineResult<Breakdown>;

    async fn list_errors(
        &self,
        request: &AnalyticsRequest,
        options: ErrorListOptions,
    ) -> EngineResult<Vec<ErrorListing>>;

    async fn update_error_status(
        &self,
        pid: &str,
        eid: &str,
        status: ErrorStatus,
    ) -> EngineResult<()>;

    async fn custom_event_metadata(
        &self,
        request: &AnalyticsRequest,
        event: &str,
    ) -> EngineResult<Vec<EventMetaRow>>;

    async fn live_visitors(&self, pid: &str) -> EngineResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_bucket_parse_round_trips_names() {
        for bucket in [
            TimeBucket::Minute,
            TimeBucket::Hour,
            TimeBucket::Day,
            TimeBucket::Month,
            TimeBucket::Year,
        ] {
            assert_eq!(TimeBucket::parse(bucket.as_str()), Ok(bucket));
        }
        assert!(TimeBucket::parse("week").is_err());
    }

    #[test]
    fn performance_rejects_traffic_only_columns() {
        assert!(MetricKind::Traffic.allows_column("ref"));
        assert!(!MetricKind::Performance.allows_column("ref"));
        assert!(MetricKind::Errors.allows_column("name"));
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let request: AnalyticsRequest = serde_json::from_str(
            r#"{"pid":"abcdefghijkl","period":"7d","timeBucket":"day","timezone":"Europe/Kyiv"}"#,
        )
        .expect("request");
        assert_eq!(request.time_bucket, Some(TimeBucket::Day));
        assert_eq!(request.period.as_deref(), Some("7d"));
    }
}
