use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use csvframe_cli::output::write_rows;
use csvframe_cli::{build_frame, parse_args, Cli, Config};
use csvframe_core::render::write_csv;
use csvframe_engine::SqliteEngine;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = parse_args();

    let mut config = Config::load()?;
    if let Some(path) = &cli.config {
        config.merge_file(path)?;
    }
    config.apply_cli(&cli);
    setup_logging(&config);

    let engine = Arc::new(SqliteEngine::with_options(config.to_engine_options()?));
    let df = build_frame(&cli, engine)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.sql {
        writeln!(out, "{}", df.debug_sql())?;
        return Ok(());
    }
    if cli.shape {
        let (rows, cols) = df.shape()?;
        writeln!(out, "({rows}, {cols})")?;
        return Ok(());
    }
    if cli.columns {
        for column in df.columns()? {
            writeln!(out, "{column}")?;
        }
        return Ok(());
    }

    let rows = fetch(&cli, &df)?;
    log::info!("{} row(s) from {}", rows.len(), cli.input.display());
    match &cli.output {
        Some(path) => write_csv(path, &rows)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => write_rows(&mut out, &rows, config.output.format)?,
    }
    Ok(())
}

fn fetch(cli: &Cli, df: &csvframe_core::DataFrame) -> Result<Vec<csvframe_core::Row>> {
    let rows = match (cli.head, cli.tail) {
        (Some(n), _) => df.head(n)?,
        (None, Some(n)) => df.tail(n)?,
        (None, None) => df.rows()?,
    };
    Ok(rows)
}

fn setup_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .format_timestamp(None)
        .init();
}
