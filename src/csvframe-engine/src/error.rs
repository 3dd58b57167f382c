use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading files or running a query
#[derive(Debug, Error)]
pub enum EngineError {
    /// A delimited file could not be read
    #[error("failed to load {path}: {source}")]
    Load {
        /// File being loaded
        path: PathBuf,
        /// Underlying polars error
        #[source]
        source: polars::error::PolarsError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite rejected a statement or the connection failed
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Two input files map to the same table name
    #[error("table {table} is provided by both {first} and {second}")]
    DuplicateTable {
        /// Table name
        table: String,
        /// File registered first
        first: PathBuf,
        /// Conflicting file
        second: PathBuf,
    },

    /// The async runtime could not be started
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<EngineError> for csvframe_core::Error {
    fn from(err: EngineError) -> Self {
        csvframe_core::Error::engine(err)
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
