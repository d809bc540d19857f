use vantage_core::store::Query;
use vantage_core::timeframe::TimeRange;

use super::filters::CompiledFilter;
use super::{base_params, RANGE_PREDICATE};

/// Page-to-page transition counts within sessions, heaviest first.
///
/// The filter should be compiled with event clauses ignored: only pageviews
/// take part in a flow.
pub fn transitions_query(pid: &str, range: &TimeRange, filter: &CompiledFilter) -> Query {
    let predicate = &filter.predicate;
    let sql = format!(
        "SELECT source, target, count() AS value FROM (\
         SELECT pg AS source, \
         leadInFrame(pg) OVER (PARTITION BY psid ORDER BY created \
         ROWS BETWEEN CURRENT ROW AND 1 FOLLOWING) AS target \
         FROM analytics WHERE {RANGE_PREDICATE}{predicate}\
         ) WHERE target != '' AND source != target \
         GROUP BY source, target ORDER BY value DESC"
    );
    Query::new(sql, base_params(pid, range, filter))
}
