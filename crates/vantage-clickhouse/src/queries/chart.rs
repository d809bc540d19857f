use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use vantage_core::analytics::{
    ChartOptions, MetricKind, PerfMeasure, RenderMode, SeriesValues, TimeBucket,
};
use vantage_core::axis::{BucketKey, ChartAxis, SeriesSet};
use vantage_core::store::{fetch_rows, ColumnStore, Query};
use vantage_core::timeframe::TimeRange;

use super::filters::CompiledFilter;
use super::{
    base_params, source_table, ERROR_STATUS_SUBQUERY, RANGE_PREDICATE, SESSION_DURATIONS_SUBQUERY,
};

pub const PERFORMANCE_TIMINGS: &[&str] =
    &["dns", "tls", "conn", "response", "render", "domLoad", "ttfb"];

/// Group key columns for a bucket, coarsest first.
pub fn group_columns(bucket: TimeBucket) -> &'static [&'static str] {
    const ALL: [&str; 5] = ["year", "month", "day", "hour", "minute"];
    match bucket {
        TimeBucket::Year => &ALL[..1],
        TimeBucket::Month => &ALL[..2],
        TimeBucket::Day => &ALL[..3],
        TimeBucket::Hour => &ALL[..4],
        TimeBucket::Minute => &ALL[..5],
    }
}

fn selector_expr(column: &str) -> &'static str {
    match column {
        "year" => "toYear(tz_created) AS year",
        "month" => "toMonth(tz_created) AS month",
        "day" => "toDayOfMonth(tz_created) AS day",
        "hour" => "toHour(tz_created) AS hour",
        _ => "toMinute(tz_created) AS minute",
    }
}

/// `(select list, group-by list)` for a bucket. Identical for every metric
/// kind so all charts line up on the same axis.
pub fn group_selectors(bucket: TimeBucket) -> (String, String) {
    let columns = group_columns(bucket);
    let select = columns
        .iter()
        .map(|column| selector_expr(column))
        .collect::<Vec<_>>()
        .join(", ");
    (select, columns.join(", "))
}

fn measure_fn(measure: PerfMeasure) -> &'static str {
    match measure {
        PerfMeasure::Average => "avg",
        PerfMeasure::Median => "median",
        PerfMeasure::P95 => "quantileExact(0.95)",
        PerfMeasure::Quantiles => "quantilesExact(0.5, 0.75, 0.95)",
    }
}

/// Running totals over the group key for the listed columns; other
/// columns pass through untouched.
fn cumulative(
    base: &str,
    group: &str,
    summed: &[&str],
    passthrough: &[&str],
    partition: Option<&str>,
) -> String {
    let over = match partition {
        Some(column) => format!("OVER (PARTITION BY {column} ORDER BY {group})"),
        None => format!("OVER (ORDER BY {group})"),
    };
    let mut columns: Vec<String> = vec![group.to_string()];
    columns.extend(passthrough.iter().map(|c| c.to_string()));
    columns.extend(summed.iter().map(|c| format!("sum({c}) {over} AS {c}")));
    format!("SELECT {} FROM ({base}) ORDER BY {group}", columns.join(", "))
}

fn finish(
    base: String,
    group: &str,
    mode: RenderMode,
    summed: &[&str],
    passthrough: &[&str],
    partition: Option<&str>,
) -> String {
    match mode {
        RenderMode::Periodical => format!("{base} ORDER BY {group}"),
        RenderMode::Cumulative => cumulative(&base, group, summed, passthrough, partition),
    }
}

/// Build the grouped chart query for a metric kind.
pub fn build_chart_query(
    pid: &str,
    kind: MetricKind,
    range: &TimeRange,
    filter: &CompiledFilter,
    options: ChartOptions,
) -> Query {
    let (select, group) = group_selectors(range.time_bucket);
    let table = source_table(kind, filter);
    let tz_created = "toTimeZone(created, {timezone:String}) AS tz_created";
    let predicate = &filter.predicate;

    let sql = match kind {
        MetricKind::Traffic => {
            let (unique_col, uniques) = if table == "analytics" {
                ("unique, ", "sum(a.unique)")
            } else {
                ("", "uniqExact(a.psid)")
            };
            let base = format!(
                "SELECT {select}, count() AS pageviews, {uniques} AS uniques, \
                 avgOrNullIf(sd.duration, sd.duration > 0) AS sdur \
                 FROM (SELECT psid, {unique_col}{tz_created} FROM {table} \
                 WHERE {RANGE_PREDICATE}{predicate}) AS a \
                 LEFT JOIN ({SESSION_DURATIONS_SUBQUERY}) AS sd ON a.psid = sd.psid \
                 GROUP BY {group}"
            );
            finish(
                base,
                &group,
                options.mode,
                &["pageviews", "uniques"],
                &["sdur"],
                None,
            )
        }
        MetricKind::Sessions => {
            let base = format!(
                "SELECT {select}, uniqExact(a.psid) AS sessions, \
                 avgOrNullIf(sd.duration, sd.duration > 0) AS sdur \
                 FROM (SELECT psid, {tz_created} FROM {table} \
                 WHERE {RANGE_PREDICATE}{predicate}) AS a \
                 LEFT JOIN ({SESSION_DURATIONS_SUBQUERY}) AS sd ON a.psid = sd.psid \
                 GROUP BY {group}"
            );
            finish(base, &group, options.mode, &["sessions"], &["sdur"], None)
        }
        MetricKind::CustomEvents => {
            let base = format!(
                "SELECT {select}, ev, count() AS count \
                 FROM (SELECT ev, {tz_created} FROM customEV WHERE {RANGE_PREDICATE}{predicate}) \
                 GROUP BY {group}, ev"
            );
            finish(base, &group, options.mode, &["count"], &["ev"], Some("ev"))
        }
        MetricKind::Performance => {
            let func = measure_fn(options.measure);
            let measures = PERFORMANCE_TIMINGS
                .iter()
                .map(|column| format!("{func}({column}) AS {column}"))
                .collect::<Vec<_>>()
                .join(", ");
            let columns = PERFORMANCE_TIMINGS.join(", ");
            // Averages of timings do not accumulate, so the render mode is ignored.
            format!(
                "SELECT {select}, {measures} \
                 FROM (SELECT {columns}, {tz_created} FROM performance \
                 WHERE {RANGE_PREDICATE}{predicate}) \
                 GROUP BY {group} ORDER BY {group}"
            )
        }
        MetricKind::Errors => {
            let status_filter = if options.show_resolved {
                ""
            } else {
                " WHERE s.status != 'resolved'"
            };
            let base = format!(
                "SELECT {select}, count() AS count \
                 FROM (SELECT eid, {tz_created} FROM errors \
                 WHERE {RANGE_PREDICATE}{predicate}) AS e \
                 LEFT JOIN ({ERROR_STATUS_SUBQUERY}) AS s ON e.eid = s.eid{status_filter} \
                 GROUP BY {group}"
            );
            finish(base, &group, options.mode, &["count"], &[], None)
        }
    };

    Query::new(sql, base_params(pid, range, filter))
}

#[derive(Debug, Deserialize)]
struct TrafficRow {
    #[serde(flatten)]
    key: BucketKey,
    pageviews: f64,
    uniques: f64,
    sdur: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SessionsRow {
    #[serde(flatten)]
    key: BucketKey,
    sessions: f64,
    sdur: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    #[serde(flatten)]
    key: BucketKey,
    count: f64,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(flatten)]
    key: BucketKey,
    ev: String,
    count: f64,
}

#[derive(Debug, Deserialize)]
struct PerformanceRow<T> {
    #[serde(flatten)]
    key: BucketKey,
    dns: Option<T>,
    tls: Option<T>,
    conn: Option<T>,
    response: Option<T>,
    render: Option<T>,
    #[serde(rename = "domLoad")]
    dom_load: Option<T>,
    ttfb: Option<T>,
}

impl<T> PerformanceRow<T> {
    fn timings(self) -> (BucketKey, [(&'static str, Option<T>); 7]) {
        (
            self.key,
            [
                ("dns", self.dns),
                ("tls", self.tls),
                ("conn", self.conn),
                ("response", self.response),
                ("render", self.render),
                ("domLoad", self.dom_load),
                ("ttfb", self.ttfb),
            ],
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn scalar(series: BTreeMap<String, Vec<f64>>) -> BTreeMap<String, SeriesValues> {
    series
        .into_iter()
        .map(|(name, values)| (name, SeriesValues::Scalar(values)))
        .collect()
}

/// Run the chart query and scatter its rows onto `axis`.
pub async fn chart_series(
    store: &dyn ColumnStore,
    query: &Query,
    kind: MetricKind,
    options: ChartOptions,
    axis: &ChartAxis,
) -> Result<BTreeMap<String, SeriesValues>> {
    // Running totals only come back for buckets with rows; empty buckets
    // hold the previous total.
    let cumulative_mode = options.mode == RenderMode::Cumulative;
    let series = match kind {
        MetricKind::Traffic => {
            let rows: Vec<TrafficRow> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::new(axis).with_series(&["visits", "uniques", "sdur"]);
            for row in &rows {
                set.put(&row.key, "visits", row.pageviews);
                set.put(&row.key, "uniques", row.uniques);
                set.put(&row.key, "sdur", round2(row.sdur.unwrap_or(0.0)));
            }
            if cumulative_mode {
                set.carry_forward(Some(&["visits", "uniques"]));
            }
            scalar(set.into_series())
        }
        MetricKind::Sessions => {
            let rows: Vec<SessionsRow> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::new(axis).with_series(&["sessions", "sdur"]);
            for row in &rows {
                set.put(&row.key, "sessions", row.sessions);
                set.put(&row.key, "sdur", round2(row.sdur.unwrap_or(0.0)));
            }
            if cumulative_mode {
                set.carry_forward(Some(&["sessions"]));
            }
            scalar(set.into_series())
        }
        MetricKind::CustomEvents => {
            let rows: Vec<EventRow> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::new(axis);
            for row in &rows {
                set.put(&row.key, &row.ev, row.count);
            }
            if cumulative_mode {
                set.carry_forward(None);
            }
            scalar(set.into_series())
        }
        MetricKind::Errors => {
            let rows: Vec<CountRow> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::new(axis).with_series(&["occurrences"]);
            for row in &rows {
                set.put(&row.key, "occurrences", row.count);
            }
            if cumulative_mode {
                set.carry_forward(None);
            }
            scalar(set.into_series())
        }
        MetricKind::Performance if options.measure == PerfMeasure::Quantiles => {
            let rows: Vec<PerformanceRow<Vec<f64>>> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::<[f64; 3]>::new(axis).with_series(PERFORMANCE_TIMINGS);
            for row in rows {
                let (key, timings) = row.timings();
                for (name, value) in timings {
                    let points = value.unwrap_or_default();
                    let at = |idx: usize| round2(points.get(idx).copied().unwrap_or(0.0));
                    set.put(&key, name, [at(0), at(1), at(2)]);
                }
            }
            set.into_series()
                .into_iter()
                .map(|(name, values)| (name, SeriesValues::Quantiles(values)))
                .collect()
        }
        MetricKind::Performance => {
            let rows: Vec<PerformanceRow<f64>> = fetch_rows(store, query).await?;
            let mut set = SeriesSet::new(axis).with_series(PERFORMANCE_TIMINGS);
            for row in rows {
                let (key, timings) = row.timings();
                for (name, value) in timings {
                    set.put(&key, name, round2(value.unwrap_or(0.0)));
                }
            }
            scalar(set.into_series())
        }
    };

    tracing::debug!(kind = kind.as_str(), points = axis.len(), "Chart series assembled");
    Ok(series)
}
