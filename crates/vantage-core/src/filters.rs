//! Filter clause parsing and column classification.
//!
//! Turning clauses into predicate text is store specific and lives with the
//! store backend; this module only owns the wire shape and its normalisation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;

/// One normalised filter clause. `filter: None` means "is null".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterClause {
    pub column: String,
    pub filter: Option<String>,
    #[serde(default)]
    pub is_exclusive: bool,
}

impl FilterClause {
    pub fn new(column: impl Into<String>, filter: Option<&str>, is_exclusive: bool) -> Self {
        Self {
            column: column.into(),
            filter: filter.map(str::to_string),
            is_exclusive,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFilterValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClause {
    column: String,
    #[serde(default)]
    filter: Option<RawFilterValue>,
    #[serde(default)]
    is_exclusive: bool,
}

/// Parse the raw JSON filter list.
///
/// Empty input and malformed JSON yield no filters; the latter is logged.
/// Well-formed JSON that is not an array of clause objects is rejected.
/// An array-valued `filter` expands into one clause per element.
pub fn parse_filters(raw: Option<&str>) -> Result<Vec<FilterClause>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Ignoring unparsable filters");
            return Ok(Vec::new());
        }
    };

    let serde_json::Value::Array(items) = value else {
        return Err(ValidationError::InvalidFilterShape);
    };

    let mut clauses = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawClause =
            serde_json::from_value(item).map_err(|_| ValidationError::InvalidFilterShape)?;
        match raw.filter {
            Some(RawFilterValue::Many(values)) => {
                clauses.extend(values.into_iter().map(|value| FilterClause {
                    column: raw.column.clone(),
                    filter: Some(value),
                    is_exclusive: raw.is_exclusive,
                }));
            }
            Some(RawFilterValue::One(value)) => clauses.push(FilterClause {
                column: raw.column,
                filter: Some(value),
                is_exclusive: raw.is_exclusive,
            }),
            None => clauses.push(FilterClause {
                column: raw.column,
                filter: None,
                is_exclusive: raw.is_exclusive,
            }),
        }
    }
    Ok(clauses)
}

/// Which `meta` arrays a meta column refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaScope {
    /// Custom event metadata (`ev:*`).
    Event,
    /// Pageview metadata (`tag:*`).
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass<'a> {
    /// A plain dimension column, subject to the per-kind allow-list.
    Plain(&'a str),
    /// `ev`: the custom event name.
    EventName,
    /// `ev:key` / `tag:key`: membership in `meta.key`.
    MetaKey(MetaScope),
    /// `ev:value` / `tag:value`: membership in `meta.value`.
    MetaValue(MetaScope),
    /// `ev:key:<k>` / `tag:key:<k>`: the value stored under key `k`.
    MetaLookup(MetaScope, &'a str),
}

impl ColumnClass<'_> {
    /// Filtering on this column means looking at custom events rather than
    /// pageviews.
    pub fn targets_custom_events(&self) -> bool {
        matches!(
            self,
            ColumnClass::EventName
                | ColumnClass::MetaKey(MetaScope::Event)
                | ColumnClass::MetaValue(MetaScope::Event)
                | ColumnClass::MetaLookup(_, _)
        )
    }

    /// Columns backed by arrays have no notion of a null element.
    pub fn is_array_backed(&self) -> bool {
        matches!(
            self,
            ColumnClass::MetaKey(_) | ColumnClass::MetaValue(_) | ColumnClass::MetaLookup(_, _)
        )
    }

    pub fn is_event_column(&self) -> bool {
        matches!(
            self,
            ColumnClass::EventName
                | ColumnClass::MetaKey(MetaScope::Event)
                | ColumnClass::MetaValue(MetaScope::Event)
                | ColumnClass::MetaLookup(MetaScope::Event, _)
        )
    }
}

pub fn classify_column(column: &str) -> ColumnClass<'_> {
    let scoped = |rest: &str, scope| match rest {
        "key" => Some(ColumnClass::MetaKey(scope)),
        "value" => Some(ColumnClass::MetaValue(scope)),
        _ => None,
    };

    if column == "ev" {
        return ColumnClass::EventName;
    }
    for (prefix, scope) in [("ev:", MetaScope::Event), ("tag:", MetaScope::Tag)] {
        if let Some(rest) = column.strip_prefix(prefix) {
            if let Some(key) = rest.strip_prefix("key:").filter(|k| !k.is_empty()) {
                return ColumnClass::MetaLookup(scope, key);
            }
            if let Some(class) = scoped(rest, scope) {
                return class;
            }
        }
    }
    ColumnClass::Plain(column)
}
