use serde::Serialize;
use siftrank_stats::StatsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankingError>;

/// Errors that end a query
#[derive(Error, Debug)]
pub enum RankingError {
    #[error(transparent)]
    Core(#[from] siftrank_core::Error),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("Invalid constraint set: {0}")]
    Parse(String),
}

impl RankingError {
    /// Whether the query stopped on its deadline or cancellation token
    pub fn is_interrupt(&self) -> bool {
        matches!(self, RankingError::Core(e) if e.is_interrupt())
    }
}

/// A constraint that was ignored; the query continues without it
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("Unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Operator {operator} is not supported on field '{field}': {reason}")]
    UnsupportedOperator {
        field: String,
        operator: String,
        reason: String,
    },

    #[error("Invalid operand for field '{field}': {reason}")]
    InvalidOperand { field: String, reason: String },
}
