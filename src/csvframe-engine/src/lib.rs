//! SQLite-backed query engine for csvframe
//!
//! [`SqliteEngine`] implements [`csvframe_core::Engine`]. For every call it
//! reads the requested delimited files with polars, copies them into a private
//! in-memory SQLite database opened through sqlx, runs the compiled query once
//! and returns the rows. Nothing is cached between calls.
//!
//! Repeated result column names are numbered in projection order (`col`,
//! `col_1`, `col_2`, ...), which is what the csvframe reconciler expects.
//!
//! The async sqlx calls run on a current-thread tokio runtime built for each
//! call, so [`SqliteEngine::execute`](csvframe_core::Engine::execute) must not
//! be called from inside another tokio runtime.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod loader;
pub mod sqlite;

use std::collections::HashMap;
use std::path::PathBuf;

use csvframe_core::state::table_name_from_path;
use csvframe_core::{Engine, Row};

pub use crate::error::{EngineError, Result};

/// How input files are parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Field separator; files ending in `.tsv` always use a tab
    pub separator: u8,
    /// Whether the first line holds column names
    pub has_header: bool,
    /// Quote character, `None` to disable quoting
    pub quote_char: Option<u8>,
    /// Rows scanned to infer column types, `None` for all rows
    pub infer_schema_length: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            has_header: true,
            quote_char: Some(b'"'),
            infer_schema_length: Some(1000),
        }
    }
}

/// Runs compiled csvframe queries on an in-memory SQLite database
#[derive(Debug, Clone, Default)]
pub struct SqliteEngine {
    options: EngineOptions,
}

impl SqliteEngine {
    /// Create an engine with default parsing options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom parsing options
    pub fn with_options(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Parsing options in use
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn run(&self, files: &[PathBuf], sql: &str) -> Result<Vec<Row>> {
        let mut registered: HashMap<String, PathBuf> = HashMap::new();
        let mut tables = Vec::with_capacity(files.len());
        for path in files {
            let name = table_name_from_path(path);
            if let Some(first) = registered.get(&name) {
                return Err(EngineError::DuplicateTable {
                    table: name,
                    first: first.clone(),
                    second: path.clone(),
                });
            }
            tables.push(loader::load_table(path, &name, &self.options)?);
            registered.insert(name, path.clone());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Runtime(e.to_string()))?;
        runtime.block_on(sqlite::run_query(&tables, sql))
    }
}

impl Engine for SqliteEngine {
    fn execute(&self, files: &[PathBuf], sql: &str) -> csvframe_core::Result<Vec<Row>> {
        Ok(self.run(files, sql)?)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvframe_core::Value;
    use std::fs;

    #[test]
    fn test_execute_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let users = dir.path().join("users.csv");
        let orders = dir.path().join("orders.csv");
        fs::write(&users, "id,name\n1,Gina\n2,Yulia\n").unwrap();
        fs::write(&orders, "id,amount\n1,10\n1,5\n").unwrap();

        let rows = SqliteEngine::new()
            .execute(
                &[users, orders],
                "SELECT users.name, SUM(orders.amount) AS total FROM users \
                 LEFT JOIN orders ON users.id = orders.id GROUP BY users.name ORDER BY users.name",
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::string("Gina"));
        assert_eq!(rows[0]["total"], Value::Int(15));
        assert_eq!(rows[1]["total"], Value::Null);
    }

    #[test]
    fn test_full_outer_join_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "id\n1\n2\n").unwrap();
        fs::write(&b, "id\n2\n3\n").unwrap();

        let rows = SqliteEngine::new()
            .execute(&[a, b], "SELECT a.id, b.id FROM a FULL OUTER JOIN b ON a.id = b.id")
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].contains_key("id_1"));
    }

    #[test]
    fn test_duplicate_table_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("x")).unwrap();
        let first = dir.path().join("users.csv");
        let second = dir.path().join("x").join("users.csv");
        fs::write(&first, "id\n1\n").unwrap();
        fs::write(&second, "id\n1\n").unwrap();

        let err = SqliteEngine::new()
            .execute(&[first, second], "SELECT * FROM users")
            .unwrap_err();
        assert!(err.to_string().contains("table users is provided by both"));
    }
}
