use vantage_core::store::Query;
use vantage_core::timeframe::TimeRange;

use super::filters::CompiledFilter;
use super::{base_params, RANGE_PREDICATE};

/// Key/value pairs attached to one custom event, with occurrence counts.
pub fn event_meta_query(
    pid: &str,
    event: &str,
    range: &TimeRange,
    filter: &CompiledFilter,
) -> Query {
    let predicate = &filter.predicate;
    let sql = format!(
        "SELECT meta.key AS key, meta.value AS value, count() AS count \
         FROM customEV ARRAY JOIN meta \
         WHERE {RANGE_PREDICATE} AND ev = {{event:String}}{predicate} \
         GROUP BY key, value ORDER BY count DESC"
    );
    Query::new(sql, base_params(pid, range, filter).with("event", event))
}

#[cfg(test)]
mod tests {
    use vantage_core::analytics::TimeBucket;
    use vantage_core::timeframe::{resolve_time_range, TimeframeQuery};

    use super::*;

    #[test]
    fn event_name_is_a_parameter() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("today"),
                time_bucket: Some(TimeBucket::Hour),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .expect("range");
        let query = event_meta_query("p1", "signup'--", &range, &CompiledFilter::default());
        assert!(query.sql.contains("ARRAY JOIN meta"));
        assert!(!query.sql.contains("signup"));
        assert_eq!(
            query.params.get("event").and_then(|v| v.as_str()),
            Some("signup'--")
        );
    }
}
