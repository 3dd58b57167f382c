use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::state::JoinKind;

/// Result type alias for csvframe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for csvframe operations
///
/// Errors are cheap to clone so that a planning error captured while the chain
/// is being built can be handed back by every later materialization call.
#[derive(Debug, Clone)]
pub enum Error {
    /// I/O errors (file creation, writing output)
    Io(Arc<io::Error>),

    /// Polars errors raised while exporting rows
    Polars(Arc<polars::error::PolarsError>),

    /// The query engine failed to open the files or run the compiled query
    Engine(Arc<dyn StdError + Send + Sync>),

    /// A merge or join was declared without any join key
    MissingJoinKey,

    /// The configured engine cannot execute this join kind
    UnsupportedJoin(JoinKind),

    /// A selected column could not be located in the reconciled row
    ColumnNotFound(String),

    /// General operation errors
    Operation(Cow<'static, str>),
}

impl Error {
    /// Create an operation error with a custom message
    pub fn operation(msg: impl Into<Cow<'static, str>>) -> Self {
        Error::Operation(msg.into())
    }

    /// Wrap an engine failure
    pub fn engine<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Engine(Arc::new(err))
    }

    /// Whether this error was raised before any query reached the engine
    #[must_use]
    pub fn is_planning(&self) -> bool {
        matches!(self, Error::MissingJoinKey | Error::UnsupportedJoin(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Polars(e) => write!(f, "DataFrame error: {e}"),
            Error::Engine(e) => write!(f, "Engine error: {e}"),
            Error::MissingJoinKey => write!(f, "merge requires at least one join key"),
            Error::UnsupportedJoin(kind) => {
                write!(f, "{} join is not supported by the configured engine", kind.as_str())
            }
            Error::ColumnNotFound(col) => write!(f, "column {col} not found"),
            Error::Operation(msg) => write!(f, "Operation error: {msg}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e.as_ref()),
            Error::Polars(e) => Some(e.as_ref()),
            Error::Engine(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(e: polars::error::PolarsError) -> Self {
        Error::Polars(Arc::new(e))
    }
}
