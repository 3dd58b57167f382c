//! Library side of the csvframe command-line tool
//!
//! Exposed so the argument handling, configuration layering and pipeline
//! construction can be tested without spawning the binary.

pub mod cli;
pub mod config;
pub mod output;
pub mod pipeline;

pub use cli::{parse_args, Cli, OutputFormat};
pub use config::Config;
pub use pipeline::build_frame;
