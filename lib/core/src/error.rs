use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity type not found: {0}")]
    UnknownEntity(String),

    #[error("Record already exists: {entity}/{id}")]
    RecordExists { entity: String, id: String },

    #[error("Cannot store records of abstract entity type: {0}")]
    AbstractEntity(String),

    #[error("Query deadline exceeded")]
    Timeout,

    #[error("Query cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error ends a query because of its deadline or cancellation token
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Timeout | Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
