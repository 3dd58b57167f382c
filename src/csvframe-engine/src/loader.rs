//! Reading delimited files into in-memory tables

use std::path::Path;

use csvframe_core::Value;
use polars::prelude::*;

use crate::error::{EngineError, Result};
use crate::EngineOptions;

/// SQLite column type used for a loaded column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Any integer dtype
    Integer,
    /// Any float dtype
    Real,
    /// Boolean dtype
    Boolean,
    /// Everything else
    Text,
}

impl ColumnType {
    fn from_dtype(dtype: &DataType) -> Self {
        if dtype.is_integer() {
            ColumnType::Integer
        } else if dtype.is_float() {
            ColumnType::Real
        } else if matches!(dtype, DataType::Boolean) {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// Declared type in CREATE TABLE
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A file loaded into memory, ready to be copied into SQLite
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    /// Table name
    pub name: String,
    /// Column names and types, in file order
    pub columns: Vec<(String, ColumnType)>,
    /// Row-major cell values
    pub rows: Vec<Vec<Value>>,
}

/// Field separator for a file: tab for `.tsv`, the configured one otherwise
pub fn separator_for(path: &Path, options: &EngineOptions) -> u8 {
    let is_tsv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
    if is_tsv {
        b'\t'
    } else {
        options.separator
    }
}

/// Read a delimited file with polars and convert it to a [`LoadedTable`]
pub fn load_table(path: &Path, name: &str, options: &EngineOptions) -> Result<LoadedTable> {
    let separator = separator_for(path, options);
    let quote_char = options.quote_char;
    let load_err = |source: PolarsError| EngineError::Load {
        path: path.to_path_buf(),
        source,
    };

    let df = CsvReadOptions::default()
        .with_has_header(options.has_header)
        .with_infer_schema_length(options.infer_schema_length)
        .map_parse_options(|parse| parse.with_separator(separator).with_quote_char(quote_char))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(load_err)?
        .finish()
        .map_err(load_err)?;

    let columns: Vec<(String, ColumnType)> = df
        .get_columns()
        .iter()
        .map(|col| (col.name().to_string(), ColumnType::from_dtype(col.dtype())))
        .collect();

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Vec::with_capacity(columns.len());
        for col in df.get_columns() {
            let cell = col.as_materialized_series().get(i).map_err(load_err)?;
            row.push(any_value_to_value(&cell));
        }
        rows.push(row);
    }

    log::debug!(
        "loaded {} as table {name}: {} row(s), {} column(s)",
        path.display(),
        rows.len(),
        columns.len()
    );
    Ok(LoadedTable {
        name: name.to_string(),
        columns,
        rows,
    })
}

fn any_value_to_value(value: &AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::Int8(i) => Value::Int(i64::from(*i)),
        AnyValue::Int16(i) => Value::Int(i64::from(*i)),
        AnyValue::Int32(i) => Value::Int(i64::from(*i)),
        AnyValue::Int64(i) => Value::Int(*i),
        AnyValue::UInt8(i) => Value::Int(i64::from(*i)),
        AnyValue::UInt16(i) => Value::Int(i64::from(*i)),
        AnyValue::UInt32(i) => Value::Int(i64::from(*i)),
        AnyValue::UInt64(i) => i64::try_from(*i).map_or_else(|_| Value::Float(*i as f64), Value::Int),
        AnyValue::Float32(f) => Value::Float(f64::from(*f)),
        AnyValue::Float64(f) => Value::Float(*f),
        AnyValue::String(s) => Value::string(*s),
        AnyValue::StringOwned(s) => Value::string(s.as_str()),
        other => Value::String(other.to_string()),
    }
}
