//! Command-line interface for csvframe
//!
//! Argument parsing only. Transformations given on the command line are
//! applied in a fixed order regardless of where they appear: joins, filters,
//! null handling, casts, mutations, renames, drops, selection and sorting.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// csvframe - pandas-style transformations over CSV files, compiled to SQL
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "csvframe")]
#[command(author, version, about)]
#[command(after_help = "EXAMPLES:\n  \
    # Adults sorted by age, oldest first\n  \
    csvframe people.csv --filter 'age >= 18' --sort age:desc\n\n  \
    # Join on a key and keep a few columns\n  \
    csvframe users.csv --join orders.csv:id --select name --select amount\n\n  \
    # Show the SQL a chain compiles to\n  \
    csvframe people.csv --rename name=full_name --mutate decade=age/10 --sql\n\n  \
    # Export to a new file\n  \
    csvframe people.csv --fill-na age=0 --cast age=INTEGER -o cleaned.csv")]
pub struct Cli {
    /// Input CSV or TSV file
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Inner join another file on a key column or an explicit condition
    #[arg(long, value_name = "FILE:KEY", action = clap::ArgAction::Append)]
    pub join: Vec<String>,

    /// Left join another file on a key column or an explicit condition
    #[arg(long = "left-join", value_name = "FILE:KEY", action = clap::ArgAction::Append)]
    pub left_join: Vec<String>,

    /// Keep rows matching a SQL predicate (can be used multiple times)
    #[arg(long, value_name = "EXPR", action = clap::ArgAction::Append)]
    pub filter: Vec<String>,

    /// Drop rows where the column is null
    #[arg(long = "drop-na", value_name = "COL", action = clap::ArgAction::Append)]
    pub drop_na: Vec<String>,

    /// Replace nulls in a column
    #[arg(long = "fill-na", value_name = "COL=VALUE", action = clap::ArgAction::Append)]
    pub fill_na: Vec<String>,

    /// Cast a column to a SQL type
    #[arg(long, value_name = "COL=TYPE", action = clap::ArgAction::Append)]
    pub cast: Vec<String>,

    /// Add or replace a column computed from a SQL expression
    #[arg(long, value_name = "NAME=EXPR", action = clap::ArgAction::Append)]
    pub mutate: Vec<String>,

    /// Rename a column
    #[arg(long, value_name = "OLD=NEW", action = clap::ArgAction::Append)]
    pub rename: Vec<String>,

    /// Remove a column from the output
    #[arg(long, value_name = "COL", action = clap::ArgAction::Append)]
    pub drop: Vec<String>,

    /// Select specific columns (can be used multiple times)
    #[arg(long, value_name = "COL", action = clap::ArgAction::Append)]
    pub select: Vec<String>,

    /// Sort by a column, append `:desc` for descending order
    #[arg(long, value_name = "COL[:desc]", action = clap::ArgAction::Append)]
    pub sort: Vec<String>,

    /// Only the first N rows
    #[arg(long, value_name = "N", conflicts_with = "tail")]
    pub head: Option<usize>,

    /// Only the last N rows
    #[arg(long, value_name = "N")]
    pub tail: Option<usize>,

    /// Print the compiled SQL instead of running it
    #[arg(long)]
    pub sql: bool,

    /// Print the (rows, columns) shape of the result
    #[arg(long, conflicts_with_all = ["sql", "columns"])]
    pub shape: bool,

    /// Print the sorted column names of the result
    #[arg(long, conflicts_with = "sql")]
    pub columns: bool,

    /// Write the result to a CSV file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format for stdout
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Field separator of the input files
    #[arg(long, value_name = "SEP")]
    pub separator: Option<String>,

    /// Input files have no header line
    #[arg(long = "no-header")]
    pub no_header: bool,

    /// Configuration file to use
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress warnings
    #[arg(short, long)]
    pub quiet: bool,
}

/// How rows are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Whitespace-aligned table
    #[default]
    Table,
    /// Comma-separated values
    Csv,
    /// JSON array of objects
    Json,
}

/// Parse command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}
