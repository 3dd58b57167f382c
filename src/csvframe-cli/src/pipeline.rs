//! Translating command-line transformations into a DataFrame chain

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use csvframe_core::{DataFrame, Engine, Value};

use crate::cli::Cli;

/// Build the lazy chain described by the command line
pub fn build_frame(cli: &Cli, engine: Arc<dyn Engine>) -> Result<DataFrame> {
    let mut df = DataFrame::new(cli.input.clone(), engine.clone());

    for spec in &cli.join {
        let (file, on) = parse_join(spec)?;
        df = df.join(&DataFrame::new(file, engine.clone()), &on);
    }
    for spec in &cli.left_join {
        let (file, on) = parse_join(spec)?;
        df = df.left_join(&DataFrame::new(file, engine.clone()), &on);
    }
    for expr in &cli.filter {
        df = df.filter(expr.as_str());
    }
    if !cli.drop_na.is_empty() {
        df = df.drop_na(cli.drop_na.iter().map(String::as_str));
    }
    for spec in &cli.fill_na {
        let (column, value) = parse_assignment(spec, "--fill-na")?;
        df = df.fill_na(column, parse_literal(&value));
    }
    for spec in &cli.cast {
        let (column, dtype) = parse_assignment(spec, "--cast")?;
        df = df.cast(column, dtype);
    }
    for spec in &cli.mutate {
        let (column, expr) = parse_assignment(spec, "--mutate")?;
        df = df.mutate(column, expr);
    }
    if !cli.rename.is_empty() {
        let mapping = cli
            .rename
            .iter()
            .map(|spec| parse_assignment(spec, "--rename"))
            .collect::<Result<Vec<_>>>()?;
        df = df.rename(mapping);
    }
    if !cli.drop.is_empty() {
        df = df.drop(cli.drop.iter().map(String::as_str));
    }
    if !cli.select.is_empty() {
        df = df.select(cli.select.iter().map(String::as_str));
    }
    for spec in &cli.sort {
        let (column, ascending) = parse_sort(spec);
        df = df.sort(column, ascending);
    }

    if let Some(err) = df.err() {
        return Err(anyhow!(err.clone()));
    }
    Ok(df)
}

/// Split `FILE:KEY`, splitting on the last colon
pub fn parse_join(spec: &str) -> Result<(PathBuf, String)> {
    match spec.rsplit_once(':') {
        Some((file, on)) if !file.is_empty() && !on.trim().is_empty() => {
            Ok((PathBuf::from(file), on.trim().to_string()))
        }
        _ => Err(anyhow!("Invalid join {spec:?}, expected FILE:KEY")),
    }
}

/// Split `NAME=VALUE` on the first `=`
pub fn parse_assignment(spec: &str, flag: &str) -> Result<(String, String)> {
    match spec.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(anyhow!("Invalid {flag} value {spec:?}, expected NAME=VALUE")),
    }
}

/// Split `COL[:asc|:desc]` into a column and a direction
pub fn parse_sort(spec: &str) -> (String, bool) {
    match spec.rsplit_once(':') {
        Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => (column.to_string(), false),
        Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => (column.to_string(), true),
        _ => (spec.to_string(), true),
    }
}

/// Interpret a command-line literal: `null`, integers, floats, booleans,
/// otherwise a string (surrounding single or double quotes are stripped)
pub fn parse_literal(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(raw);
    Value::string(unquoted)
}
