//! Writing materialized rows to stdout

use std::io::Write;

use anyhow::{Context, Result};
use csvframe_core::render::{rows_to_frame, write_table};
use csvframe_core::Row;
use polars::prelude::*;

use crate::cli::OutputFormat;

/// Write rows in the requested format
pub fn write_rows<W: Write>(out: &mut W, rows: &[Row], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => write_table(out, rows).context("Failed to write table"),
        OutputFormat::Csv => write_csv(out, rows),
        OutputFormat::Json => write_json(out, rows),
    }
}

fn write_csv<W: Write>(out: &mut W, rows: &[Row]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut df = rows_to_frame(rows)?;
    CsvWriter::new(&mut *out)
        .include_header(true)
        .finish(&mut df)
        .context("Failed to write CSV")?;
    out.flush()?;
    Ok(())
}

fn write_json<W: Write>(out: &mut W, rows: &[Row]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, rows).context("Failed to write JSON")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
