use vantage_core::comparison::{CURRENT_SORT_ORDER, PREVIOUS_SORT_ORDER};
use vantage_core::store::Query;
use vantage_core::timeframe::{TimeRange, DATE_TIME_FORMAT};

use super::filters::CompiledFilter;
use super::{base_params, source_table, SESSION_DURATIONS_SUBQUERY};
use vantage_core::analytics::MetricKind;

fn window_select(
    table: &str,
    sort_order: u8,
    from: &str,
    to: &str,
    filter: &CompiledFilter,
) -> String {
    let predicate = &filter.predicate;
    let unique = if table == "analytics" {
        "sum(a.unique)"
    } else {
        "uniqExact(a.psid)"
    };
    let unique_col = if table == "analytics" { ", unique" } else { "" };
    format!(
        "SELECT {sort_order} AS sortOrder, count() AS `all`, {unique} AS `unique`, \
         avgOrNullIf(sd.duration, sd.duration > 0) AS sdur \
         FROM (SELECT psid{unique_col} FROM {table} \
         WHERE pid = {{pid:String}} \
         AND created BETWEEN {{{from}:String}} AND {{{to}:String}}{predicate}) AS a \
         LEFT JOIN ({SESSION_DURATIONS_SUBQUERY}) AS sd ON a.psid = sd.psid"
    )
}

/// Current and previous window totals in one round trip, tagged by
/// `sortOrder`. With `include_previous` off only the current half is sent.
pub fn summary_query(
    pid: &str,
    range: &TimeRange,
    filter: &CompiledFilter,
    include_previous: bool,
) -> Query {
    let table = source_table(MetricKind::Traffic, filter);
    let mut params = base_params(pid, range, filter);
    let mut sql = window_select(table, CURRENT_SORT_ORDER, "groupFrom", "groupTo", filter);

    if include_previous {
        let (prev_from, prev_to) = range.previous_window();
        params.insert("groupFromPrev", prev_from.format(DATE_TIME_FORMAT).to_string());
        params.insert("groupToPrev", prev_to.format(DATE_TIME_FORMAT).to_string());
        sql.push_str(" UNION ALL ");
        sql.push_str(&window_select(
            table,
            PREVIOUS_SORT_ORDER,
            "groupFromPrev",
            "groupToPrev",
            filter,
        ));
    }

    Query::new(sql, params)
}

#[cfg(test)]
mod tests {
    use vantage_core::analytics::TimeBucket;
    use vantage_core::timeframe::{resolve_time_range, TimeframeQuery};

    use super::*;

    fn range() -> TimeRange {
        resolve_time_range(
            &TimeframeQuery {
                from: Some("2024-03-08"),
                to: Some("2024-03-14"),
                time_bucket: Some(TimeBucket::Day),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .expect("range")
    }

    #[test]
    fn previous_window_precedes_current() {
        let query = summary_query("p1", &range(), &CompiledFilter::default(), true);
        assert!(query.sql.contains("1 AS sortOrder"));
        assert!(query.sql.contains("UNION ALL SELECT 2 AS sortOrder"));
        assert_eq!(
            query.params.get("groupToPrev").and_then(|v| v.as_str()),
            Some("2024-03-07 23:59:59")
        );
        assert_eq!(
            query.params.get("groupFromPrev").and_then(|v| v.as_str()),
            Some("2024-03-01 00:00:00")
        );
    }

    #[test]
    fn all_time_sends_current_half_only() {
        let query = summary_query("p1", &range(), &CompiledFilter::default(), false);
        assert!(!query.sql.contains("UNION ALL"));
        assert!(query.params.get("groupFromPrev").is_none());
    }
}
