use vantage_core::store::{Query, QueryParams};
use vantage_core::timeframe::TimeRange;

use super::RANGE_PREDICATE;

/// Level reached by every session that matched at least the first step,
/// grouped by level.
///
/// Pageviews contribute their path and custom events their name, so a step
/// may be either. The window is an integer from configuration and is spliced
/// in directly because `windowFunnel` takes it as a literal.
pub fn funnel_query(pid: &str, steps: &[String], range: &TimeRange, window_secs: u64) -> Query {
    let mut params = QueryParams::new()
        .with("pid", pid)
        .with("groupFrom", range.from_utc_str())
        .with("groupTo", range.to_utc_str());

    let conditions = steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let name = format!("step_{idx}");
            params.insert(name.clone(), step.as_str());
            format!("value = {{{name}:String}}")
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT level, count() AS c FROM (\
         SELECT psid, windowFunnel({window_secs})(created, {conditions}) AS level FROM (\
         SELECT psid, pg AS value, created FROM analytics WHERE {RANGE_PREDICATE} \
         UNION ALL \
         SELECT psid, ev AS value, created FROM customEV WHERE {RANGE_PREDICATE}\
         ) GROUP BY psid\
         ) WHERE level > 0 GROUP BY level ORDER BY level"
    );
    Query::new(sql, params)
}
