//! csvframe-core: lazy operation accumulation and SQL compilation for csvframe
//!
//! This crate provides the engine-independent heart of csvframe, a pandas-style
//! transformation API over delimited files. Chained calls on a [`DataFrame`]
//! are recorded as [`Operation`]s; only when results are requested are they
//! folded into a [`QueryState`], compiled into a single SQL statement, run by an
//! [`Engine`] and reconciled back into the logical schema of the chain.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use csvframe_core::{DataFrame, MergeOptions};
//!
//! let users = DataFrame::new("users.csv", engine.clone());
//! let orders = DataFrame::new("orders.csv", engine);
//!
//! let rows = users
//!     .select(["id", "name", "age"])
//!     .filter("age >= 25")
//!     .rename([("name", "full_name")])
//!     .merge(&orders, &MergeOptions::on(["id"]).how("left"))
//!     .sort("age", false)
//!     .rows()?;
//! # Ok::<(), csvframe_core::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`ops`] - recorded operations and how each folds into the query state
//! - [`state`] - the query state accumulator and rename resolution
//! - [`compiler`] - query state to SQL text
//! - [`reconcile`] - repair of raw engine rows (shadowing, join suffixes,
//!   renames, drops, final selection)
//! - [`frame`] - the chainable [`DataFrame`] handle
//! - [`engine`] - the [`Engine`] trait query execution is delegated to
//! - [`render`] - aligned text and CSV output

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod compiler;
pub mod engine;
/// Error types and handling
pub mod error;
pub mod frame;
pub mod ops;
pub mod reconcile;
pub mod render;
pub mod state;
pub mod value;

pub use crate::engine::Engine;
pub use crate::error::{Error, Result};
pub use crate::frame::{DataFrame, MergeOptions};
pub use crate::ops::Operation;
pub use crate::state::{JoinKind, QueryState, Suffixes, WarningBag};
pub use crate::value::{Row, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{DataFrame, Engine, Error, JoinKind, MergeOptions, Result, Row, Value};
}
