use thiserror::Error;

/// Malformed or contradictory request input. Always surfaced to the caller
/// with a specific message and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("either a period or a from/to pair is required")]
    MissingTimeframe,

    #[error("the timeframe ({field}) is incorrectly represented")]
    InvalidDate { field: &'static str },

    #[error("the timeframe is incorrect: from must not be after to")]
    InvertedRange,

    #[error("unknown period: {0}")]
    InvalidPeriod(String),

    #[error("the specified date range is too large")]
    RangeTooLarge,

    #[error("the {bucket} time bucket is not allowed for a {days} day range")]
    BucketNotAllowed { bucket: &'static str, days: i64 },

    #[error("invalid time bucket: {0}")]
    InvalidTimeBucket(String),

    #[error("filters must be an array of filter clauses")]
    InvalidFilterShape,

    #[error("the provided filters are not supported: {0}")]
    UnsupportedFilter(String),

    #[error("invalid funnel: {0}")]
    InvalidFunnel(String),

    #[error("invalid error id: {0}")]
    InvalidErrorId(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingTimeframe => "missing_timeframe",
            ValidationError::InvalidDate { .. } => "invalid_date",
            ValidationError::InvertedRange => "inverted_range",
            ValidationError::InvalidPeriod(_) => "invalid_period",
            ValidationError::RangeTooLarge => "range_too_large",
            ValidationError::BucketNotAllowed { .. } => "bucket_not_allowed",
            ValidationError::InvalidTimeBucket(_) => "invalid_time_bucket",
            ValidationError::InvalidFilterShape => "invalid_filter_shape",
            ValidationError::UnsupportedFilter(_) => "unsupported_filter",
            ValidationError::InvalidFunnel(_) => "invalid_funnel",
            ValidationError::InvalidErrorId(_) => "invalid_error_id",
        }
    }
}

/// Engine-level errors.
///
/// Each variant carries enough information for a transport layer to render a
/// response; see [`EngineError::to_response_parts`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream query failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    /// `(status, code, message)` as an HTTP layer would report it.
    ///
    /// Upstream failures are logged here with full context and reported with
    /// a generic message so store internals never leak to clients.
    pub fn to_response_parts(&self) -> (u16, &'static str, String) {
        match self {
            EngineError::Validation(err) => (400, err.code(), err.to_string()),
            EngineError::NotFound(what) => (404, "not_found", format!("{what} not found")),
            EngineError::Upstream(err) => {
                tracing::error!(error = ?err, "Upstream query error");
                (
                    503,
                    "upstream_unavailable",
                    "Analytics are temporarily unavailable, please try again later".to_string(),
                )
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
