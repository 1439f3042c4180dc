use thiserror::Error;

/// Analysis error with automatic error trait implementations.
///
/// Only two things can actually fail in the core: parsing EXPLAIN JSON
/// and a cooperative cancellation. Rule failures never surface here;
/// they are contained per rule and logged.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("invalid EXPLAIN JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("EXPLAIN JSON array is empty")]
    EmptyExplain,

    #[error("EXPLAIN JSON does not contain a 'Plan' node")]
    MissingPlan,

    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalyzeError {
    /// True for the parse-failure variants, where the caller may fall
    /// back to static-only analysis.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidJson(_) | Self::EmptyExplain | Self::MissingPlan
        )
    }
}

pub type AnalyzeResult<T> = Result<T, AnalyzeError>;
