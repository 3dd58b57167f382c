//! csvframe: lazy, pandas-style transformations over CSV files
//!
//! Chained calls are recorded instead of executed and the whole chain is
//! compiled into a single SQL query when results are requested. Queries run on
//! a private in-memory SQLite database loaded from the files the chain reads.
//!
//! ```rust,no_run
//! use csvframe::{read_csv, MergeOptions};
//!
//! let users = read_csv("users.csv");
//! let orders = read_csv("orders.csv").rename([("amount", "total")]);
//!
//! let top = users
//!     .select(["id", "name", "age"])
//!     .filter("age >= 25")
//!     .merge(&orders, &MergeOptions::on(["id"]).how("left"))
//!     .sort("total", false)
//!     .head(10)?;
//! # Ok::<(), csvframe::Error>(())
//! ```
//!
//! The engine-independent parts live in [`csvframe_core`]; the SQLite engine
//! in [`csvframe_engine`].

use std::path::PathBuf;
use std::sync::Arc;

pub use csvframe_core::{
    compiler, ops, prelude, reconcile, render, state, DataFrame, Engine, Error, JoinKind,
    MergeOptions, Operation, QueryState, Result, Row, Suffixes, Value, WarningBag,
};
pub use csvframe_engine::{EngineError, EngineOptions, SqliteEngine};

/// Open a CSV (or `.tsv`) file with default parsing options, like `pandas.read_csv`
///
/// The file is not read until the returned frame is materialized.
pub fn read_csv(path: impl Into<PathBuf>) -> DataFrame {
    read_csv_with(path, EngineOptions::default())
}

/// Open a delimited file with custom parsing options
pub fn read_csv_with(path: impl Into<PathBuf>, options: EngineOptions) -> DataFrame {
    let path = path.into();
    log::debug!("opening {} lazily", path.display());
    DataFrame::new(path, Arc::new(SqliteEngine::with_options(options)))
}
