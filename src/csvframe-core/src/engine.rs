//! Query engine abstraction

use std::path::PathBuf;

use crate::error::Result;
use crate::state::JoinKind;
use crate::value::Row;

/// Executes a compiled query against a set of delimited files
///
/// Each file is exposed as a table named after the file without its
/// extensions. Duplicate result column names must be numbered positionally
/// (`col`, `col_1`, `col_2`, ...) in projection order; the reconciler depends
/// on that convention.
pub trait Engine: Send + Sync {
    /// Open `files`, run `sql` once and return every row
    ///
    /// All resources acquired for the call are released before returning,
    /// on success and on error.
    fn execute(&self, files: &[PathBuf], sql: &str) -> Result<Vec<Row>>;

    /// Whether this engine can run the given join kind
    fn supports_join(&self, _kind: JoinKind) -> bool {
        true
    }

    /// Engine name for diagnostics
    fn name(&self) -> &str {
        "engine"
    }
}
