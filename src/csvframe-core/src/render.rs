//! Text and CSV rendering of materialized rows

use std::fs::File;
use std::io::Write;
use std::path::Path;

use polars::prelude::*;

use crate::error::Result;
use crate::value::Row;

const COLUMN_PADDING: usize = 2;

/// Column names of a row, sorted
#[must_use]
pub fn sorted_keys(row: &Row) -> Vec<String> {
    let mut keys: Vec<String> = row.keys().cloned().collect();
    keys.sort();
    keys
}

/// Write rows as whitespace-aligned text with a sorted header line
///
/// Every column but the last is padded to its widest cell plus two spaces.
/// Nothing is written when `rows` is empty.
pub fn write_table<W: Write>(out: &mut W, rows: &[Row]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let keys = sorted_keys(first);

    let mut lines: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    lines.push(keys.clone());
    for row in rows {
        lines.push(
            keys.iter()
                .map(|key| row.get(key).map(ToString::to_string).unwrap_or_default())
                .collect(),
        );
    }

    let mut widths = vec![0usize; keys.len()];
    for line in &lines {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    for line in &lines {
        let mut text = String::new();
        let last = line.len().saturating_sub(1);
        for (i, cell) in line.iter().enumerate() {
            text.push_str(cell);
            if i < last {
                let pad = widths[i] - cell.chars().count() + COLUMN_PADDING;
                text.extend(std::iter::repeat(' ').take(pad));
            }
        }
        writeln!(out, "{text}")?;
    }
    out.flush()?;
    Ok(())
}

/// Build a string-typed polars frame from rows, columns in sorted order
pub fn rows_to_frame(rows: &[Row]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::empty());
    };
    let columns = sorted_keys(first)
        .into_iter()
        .map(|key| {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| row.get(&key).and_then(|v| v.to_field()))
                .collect();
            Series::new(PlSmallStr::from(key.as_str()), values).into()
        })
        .collect::<Vec<Column>>();
    Ok(DataFrame::new(columns)?)
}

/// Write rows to a CSV file with a sorted header; nulls become empty fields
///
/// Zero rows produce an empty file.
pub fn write_csv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut file = File::create(path)?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut df = rows_to_frame(rows)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}
