use vantage_core::analytics::MetricKind;
use vantage_core::store::Query;
use vantage_core::timeframe::TimeRange;

use super::filters::CompiledFilter;
use super::{base_params, RANGE_PREDICATE};

/// Which rows a dimension breakdown counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownShape {
    /// A custom-event filter is active: count matching events.
    CustomEvents,
    /// A page filter is active: every pageview counts, not only first visits.
    PageInclusive,
    /// Performance or error stream.
    Stream(&'static str),
    /// Unique pageviews, except for the page column itself.
    UniqueAnalytics,
}

impl BreakdownShape {
    pub fn pick(kind: MetricKind, filter: &CompiledFilter, page_inclusive: bool) -> Self {
        match kind {
            MetricKind::Performance => BreakdownShape::Stream("performance"),
            MetricKind::Errors => BreakdownShape::Stream("errors"),
            MetricKind::CustomEvents => BreakdownShape::CustomEvents,
            _ if filter.custom_event_filter_applied => BreakdownShape::CustomEvents,
            _ if page_inclusive => BreakdownShape::PageInclusive,
            _ => BreakdownShape::UniqueAnalytics,
        }
    }
}

/// Counts per distinct value of `column`, largest first. `column` must come
/// from the kind's allow-list; NULL values are never reported.
pub fn per_dimension_breakdown(
    pid: &str,
    column: &str,
    kind: MetricKind,
    range: &TimeRange,
    filter: &CompiledFilter,
    page_inclusive: bool,
) -> Query {
    let shape = BreakdownShape::pick(kind, filter, page_inclusive);
    let (table, extra) = match shape {
        BreakdownShape::CustomEvents => ("customEV", ""),
        BreakdownShape::PageInclusive => ("analytics", ""),
        BreakdownShape::Stream(table) => (table, ""),
        BreakdownShape::UniqueAnalytics if column == "pg" => ("analytics", ""),
        BreakdownShape::UniqueAnalytics => ("analytics", " AND unique = 1"),
    };
    let predicate = &filter.predicate;
    let sql = format!(
        "SELECT {column} AS name, count() AS count FROM {table} \
         WHERE {RANGE_PREDICATE}{predicate}{extra} AND {column} IS NOT NULL \
         GROUP BY {column} ORDER BY count DESC"
    );
    Query::new(sql, base_params(pid, range, filter))
}

#[cfg(test)]
mod tests {
    use vantage_core::analytics::TimeBucket;
    use vantage_core::timeframe::{resolve_time_range, TimeframeQuery};

    use super::*;
    use crate::queries::filters::compile_filters;

    fn range() -> TimeRange {
        resolve_time_range(
            &TimeframeQuery {
                period: Some("7d"),
                time_bucket: Some(TimeBucket::Day),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .expect("range")
    }

    #[test]
    fn default_shape_counts_unique_rows_except_for_pages() {
        let filter = CompiledFilter::default();
        let by_country =
            per_dimension_breakdown("p1", "cc", MetricKind::Traffic, &range(), &filter, false);
        assert!(by_country.sql.contains("FROM analytics"));
        assert!(by_country.sql.contains("AND unique = 1"));
        assert!(by_country.sql.contains("AND cc IS NOT NULL"));

        let by_page =
            per_dimension_breakdown("p1", "pg", MetricKind::Traffic, &range(), &filter, false);
        assert!(!by_page.sql.contains("unique = 1"));
    }

    #[test]
    fn shape_follows_filters_and_kind() {
        let events = compile_filters(
            Some(r#"[{"column":"ev","filter":"signup"}]"#),
            MetricKind::Traffic,
            false,
        )
        .expect("filter");
        assert_eq!(
            BreakdownShape::pick(MetricKind::Traffic, &events, true),
            BreakdownShape::CustomEvents
        );
        let none = CompiledFilter::default();
        assert_eq!(
            BreakdownShape::pick(MetricKind::Traffic, &none, true),
            BreakdownShape::PageInclusive
        );
        assert_eq!(
            BreakdownShape::pick(MetricKind::Errors, &events, false),
            BreakdownShape::Stream("errors")
        );

        let query =
            per_dimension_breakdown("p1", "br", MetricKind::Traffic, &range(), &events, false);
        assert!(query.sql.contains("FROM customEV"));
        assert!(query.sql.contains("ev = {qf_0_0:String}"));
    }
}
