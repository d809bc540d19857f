//! Column-store abstraction and the typed query representation.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A bound query parameter. The value set is closed on purpose: anything else
/// has to be rendered to one of these before it can reach the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Null,
}

impl ParamValue {
    /// Text form sent to the store alongside the query.
    pub fn to_wire(&self) -> String {
        match self {
            ParamValue::Str(value) => value.clone(),
            ParamValue::Int(value) => value.to_string(),
            ParamValue::Float(value) => value.to_string(),
            ParamValue::Null => "\\N".to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Parameters keyed by their generated placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`QueryParams::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn extend(&mut self, other: &QueryParams) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Query text plus the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub sql: String,
    pub params: QueryParams,
}

impl Query {
    pub fn new(sql: impl Into<String>, params: QueryParams) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Column-store query interface.
///
/// `query` returns one JSON object per result row; callers decode them into
/// explicit row types through [`fetch_rows`].
#[async_trait::async_trait]
pub trait ColumnStore: Send + Sync + 'static {
    async fn query(&self, query: &Query) -> anyhow::Result<Vec<serde_json::Value>>;

    async fn execute(&self, query: &Query) -> anyhow::Result<()>;
}

/// Run `query` and decode every row into `T`.
pub async fn fetch_rows<T: DeserializeOwned>(
    store: &dyn ColumnStore,
    query: &Query,
) -> anyhow::Result<Vec<T>> {
    let rows = store.query(query).await?;
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| {
            serde_json::from_value(row)
                .with_context(|| format!("malformed row {idx} returned by the column store"))
        })
        .collect()
}
