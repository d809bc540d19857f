//! Query builders. Each module turns a resolved range plus a compiled filter
//! into [`Query`] values; only identifiers from fixed lists are spliced into
//! the SQL text, every value travels as a `{name:Type}` parameter.
//!
//! [`Query`]: vantage_core::store::Query

pub mod breakdown;
pub mod chart;
pub mod errors;
pub mod filters;
pub mod flow;
pub mod funnel;
pub mod meta;
pub mod summary;

use vantage_core::analytics::MetricKind;
use vantage_core::store::QueryParams;
use vantage_core::timeframe::{TimeRange, DATE_TIME_FORMAT};

use filters::CompiledFilter;

/// Predicate restricting a table to the project and window.
pub(crate) const RANGE_PREDICATE: &str =
    "pid = {pid:String} AND created BETWEEN {groupFrom:String} AND {groupTo:String}";

/// Per-session average duration, joined onto pageview streams.
pub(crate) const SESSION_DURATIONS_SUBQUERY: &str =
    "SELECT psid, avg(duration) AS duration FROM session_durations \
     WHERE pid = {pid:String} GROUP BY psid";

/// Latest status per error id.
pub(crate) const ERROR_STATUS_SUBQUERY: &str =
    "SELECT eid, argMax(status, created) AS status FROM error_statuses \
     WHERE pid = {pid:String} GROUP BY eid";

/// Parameters shared by every query over a window: project, bounds and
/// timezone, plus the compiled filter's bindings.
pub(crate) fn base_params(pid: &str, range: &TimeRange, filter: &CompiledFilter) -> QueryParams {
    let mut params = QueryParams::new()
        .with("pid", pid)
        .with("groupFrom", range.from_utc_str())
        .with("groupTo", range.to_utc_str())
        .with("timezone", range.timezone.name());
    params.extend(&filter.params);
    params
}

/// The raw event table a metric kind reads from.
pub fn source_table(kind: MetricKind, filter: &CompiledFilter) -> &'static str {
    match kind {
        MetricKind::CustomEvents => "customEV",
        MetricKind::Performance => "performance",
        MetricKind::Errors => "errors",
        MetricKind::Traffic | MetricKind::Sessions if filter.custom_event_filter_applied => {
            "customEV"
        }
        MetricKind::Traffic | MetricKind::Sessions => "analytics",
    }
}

/// Earliest event of a project in `table`, for `all`-time ranges.
pub fn first_event_query(pid: &str, table: &'static str) -> vantage_core::store::Query {
    vantage_core::store::Query::new(
        format!(
            "SELECT formatDateTime(minOrNull(created), '%Y-%m-%d %H:%i:%S', 'UTC') AS first_event \
             FROM {table} WHERE pid = {{pid:String}}"
        ),
        QueryParams::new().with("pid", pid),
    )
}

#[derive(Debug, serde::Deserialize)]
pub struct FirstEventRow {
    pub first_event: Option<String>,
}

impl FirstEventRow {
    pub fn parse(&self) -> Option<chrono::NaiveDateTime> {
        self.first_event
            .as_deref()
            .and_then(|raw| chrono::NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT).ok())
    }
}
