use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed item table at line {line}: {message}")]
    ItemTable { line: usize, message: String },

    #[error("Invalid filter `{filter}`: {message}")]
    Filter { filter: String, message: String },

    #[error("By-level not found: {0}")]
    ByLevelNotFound(String),

    #[error("No features for item {0}")]
    MissingFeatures(u64),

    #[error("Distance error: {0}")]
    Distance(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
