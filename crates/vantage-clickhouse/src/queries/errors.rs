use serde::Deserialize;

use vantage_core::analytics::{ErrorListOptions, ErrorStatus};
use vantage_core::store::{Query, QueryParams};
use vantage_core::timeframe::TimeRange;

use super::filters::CompiledFilter;
use super::{base_params, ERROR_STATUS_SUBQUERY, RANGE_PREDICATE};

/// Errors in the window grouped by id, most recently seen first, one page
/// at a time.
pub fn list_errors_query(
    pid: &str,
    range: &TimeRange,
    filter: &CompiledFilter,
    options: ErrorListOptions,
) -> Query {
    let predicate = &filter.predicate;
    let status_filter = if options.show_resolved {
        ""
    } else {
        " WHERE s.status != 'resolved'"
    };
    let sql = format!(
        "SELECT e.eid AS eid, any(e.name) AS name, any(e.message) AS message, \
         any(e.filename) AS filename, count() AS count, \
         formatDateTime(max(e.created), '%Y-%m-%d %H:%i:%S', 'UTC') AS last_seen, \
         any(if(s.status = '', 'active', s.status)) AS status \
         FROM (SELECT eid, name, message, filename, created FROM errors \
         WHERE {RANGE_PREDICATE}{predicate}) AS e \
         LEFT JOIN ({ERROR_STATUS_SUBQUERY}) AS s ON e.eid = s.eid{status_filter} \
         GROUP BY e.eid ORDER BY last_seen DESC \
         LIMIT {{take:UInt32}} OFFSET {{skip:UInt32}}"
    );
    let params = base_params(pid, range, filter)
        .with("take", options.take)
        .with("skip", options.skip);
    Query::new(sql, params)
}

pub fn error_exists_query(pid: &str, eid: &str) -> Query {
    Query::new(
        "SELECT count() AS c FROM errors WHERE pid = {pid:String} AND eid = {eid:String}",
        QueryParams::new().with("pid", pid).with("eid", eid),
    )
}

#[derive(Debug, Deserialize)]
pub struct CountRow {
    pub c: u64,
}

/// Status changes are appended; readers take the latest per error id.
pub fn insert_status_query(pid: &str, eid: &str, status: ErrorStatus) -> Query {
    Query::new(
        "INSERT INTO error_statuses (eid, pid, status, created) \
         SELECT {eid:String}, {pid:String}, {status:String}, now()",
        QueryParams::new()
            .with("eid", eid)
            .with("pid", pid)
            .with("status", status.as_str()),
    )
}

/// Error ids are 32 hex characters, either case.
pub fn is_valid_eid(eid: &str) -> bool {
    eid.len() == 32 && eid.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use vantage_core::analytics::TimeBucket;
    use vantage_core::store::ParamValue;
    use vantage_core::timeframe::{resolve_time_range, TimeframeQuery};

    use super::*;

    #[test]
    fn listing_is_paginated_through_parameters() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("7d"),
                time_bucket: Some(TimeBucket::Day),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .expect("range");
        let query = list_errors_query(
            "p1",
            &range,
            &CompiledFilter::default(),
            ErrorListOptions {
                take: 10,
                skip: 20,
                ..Default::default()
            },
        );
        assert!(query.sql.contains("LIMIT {take:UInt32} OFFSET {skip:UInt32}"));
        assert!(query.sql.contains("s.status != 'resolved'"));
        assert_eq!(query.params.get("take"), Some(&ParamValue::Int(10)));
        assert_eq!(query.params.get("skip"), Some(&ParamValue::Int(20)));
    }

    #[test]
    fn status_insert_binds_every_value() {
        let query = insert_status_query(
            "p1",
            "0123456789abcdef0123456789abcdef",
            ErrorStatus::Resolved,
        );
        assert!(query.sql.starts_with("INSERT INTO error_statuses"));
        assert_eq!(
            query.params.get("status").and_then(ParamValue::as_str),
            Some("resolved")
        );
    }

    #[test]
    fn eid_must_be_32_hex_chars() {
        assert!(is_valid_eid("0123456789abcdef0123456789ABCDEF"));
        assert!(!is_valid_eid("0123456789abcdef"));
        assert!(!is_valid_eid("0123456789abcdef0123456789abcdeg"));
    }
}
