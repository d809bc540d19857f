//! Compile filter clauses into a parameterised ClickHouse predicate.

use serde::Serialize;

use vantage_core::analytics::MetricKind;
use vantage_core::error::ValidationError;
use vantage_core::filters::{classify_column, parse_filters, ColumnClass, FilterClause};
use vantage_core::store::QueryParams;

/// A request's filters, compiled once and shared by every query built for
/// that request so sibling queries agree on predicate and parameters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFilter {
    /// Empty, or `" AND (...) AND (...)"` ready to append to a WHERE clause.
    pub predicate: String,
    pub params: QueryParams,
    pub normalized_clauses: Vec<FilterClause>,
    pub custom_event_filter_applied: bool,
    pub page_inclusive: bool,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.predicate.is_empty()
    }
}

/// Group clauses by column, keeping first-appearance order.
fn group_by_column(clauses: &[FilterClause]) -> Vec<(&str, Vec<&FilterClause>)> {
    let mut groups: Vec<(&str, Vec<&FilterClause>)> = Vec::new();
    for clause in clauses {
        match groups.iter_mut().find(|(column, _)| *column == clause.column) {
            Some((_, members)) => members.push(clause),
            None => groups.push((clause.column.as_str(), vec![clause])),
        }
    }
    groups
}

fn negate_if(exclusive: bool, expr: String) -> String {
    if exclusive {
        format!("NOT ({expr})")
    } else {
        expr
    }
}

/// One clause's predicate, or `None` when the clause cannot apply (a null
/// filter on an array-backed column).
fn clause_predicate(
    class: ColumnClass<'_>,
    clause: &FilterClause,
    param: &str,
    key_param: &str,
) -> Option<String> {
    let exclusive = clause.is_exclusive;
    if clause.filter.is_none() {
        if class.is_array_backed() {
            return None;
        }
        let column = match class {
            ColumnClass::Plain(column) => column,
            _ => "ev",
        };
        let op = if exclusive { "IS NOT NULL" } else { "IS NULL" };
        return Some(format!("{column} {op}"));
    }

    let expr = match class {
        ColumnClass::Plain(column) => {
            let op = if exclusive { "!=" } else { "=" };
            return Some(format!("{column} {op} {{{param}:String}}"));
        }
        ColumnClass::EventName => {
            let op = if exclusive { "!=" } else { "=" };
            return Some(format!("ev {op} {{{param}:String}}"));
        }
        ColumnClass::MetaKey(_) => format!("has(meta.key, {{{param}:String}})"),
        ColumnClass::MetaValue(_) => format!("has(meta.value, {{{param}:String}})"),
        ColumnClass::MetaLookup(_, _) => format!(
            "indexOf(meta.key, {{{key_param}:String}}) > 0 \
             AND meta.value[indexOf(meta.key, {{{key_param}:String}})] = {{{param}:String}}"
        ),
    };
    Some(negate_if(exclusive, expr))
}

/// Parse and compile the raw JSON filter list for a metric kind.
///
/// Plain columns must be in the kind's allow-list; meta columns are always
/// accepted. Clauses on one column are OR-ed, columns are AND-ed. With
/// `ignore_event_filter` the `ev*` clauses are dropped, for queries that run
/// against pageviews only.
pub fn compile_filters(
    raw: Option<&str>,
    kind: MetricKind,
    ignore_event_filter: bool,
) -> Result<CompiledFilter, ValidationError> {
    let clauses = parse_filters(raw)?;

    let mut kept = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let class = classify_column(&clause.column);
        if let ColumnClass::Plain(column) = class {
            if !kind.allows_column(column) {
                return Err(ValidationError::UnsupportedFilter(column.to_string()));
            }
        }
        if ignore_event_filter && class.is_event_column() {
            continue;
        }
        kept.push(clause);
    }

    let mut compiled = CompiledFilter::default();
    for (group_idx, (column, members)) in group_by_column(&kept).into_iter().enumerate() {
        let class = classify_column(column);
        let key_param = format!("qf_{group_idx}_k");
        if class.targets_custom_events() {
            compiled.custom_event_filter_applied = true;
        }
        if let ColumnClass::MetaLookup(_, key) = class {
            compiled.params.insert(key_param.clone(), key);
        }

        let mut parts = Vec::with_capacity(members.len());
        for (idx, clause) in members.iter().enumerate() {
            let param = format!("qf_{group_idx}_{idx}");
            if let Some(value) = &clause.filter {
                compiled.params.insert(param.clone(), value.as_str());
            }
            if let Some(part) = clause_predicate(class, clause, &param, &key_param) {
                parts.push(part);
            }
        }
        if !parts.is_empty() {
            compiled.predicate.push_str(&format!(" AND ({})", parts.join(" OR ")));
        }
    }

    compiled.page_inclusive = kind != MetricKind::Performance
        && kept.iter().any(|c| c.column == "pg" && !c.is_exclusive);
    compiled.normalized_clauses = kept;
    Ok(compiled)
}
