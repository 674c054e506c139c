use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid percentile direction: {0} (expected lt, lte, gt or gte)")]
    InvalidDirection(String),

    #[error("Invalid segment: lower edge {lo} is above upper edge {hi}")]
    InvalidSegment { lo: f64, hi: f64 },

    #[error("Statistics storage error: {0}")]
    Storage(String),

    #[error("Statistics serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for StatsError {
    fn from(e: heed::Error) -> Self {
        StatsError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for StatsError {
    fn from(e: bincode::Error) -> Self {
        StatsError::Serialization(e.to_string())
    }
}
