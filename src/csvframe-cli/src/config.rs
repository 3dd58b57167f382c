//! Configuration management for csvframe
//!
//! Settings are layered: built-in defaults, then the first configuration file
//! found, then `CSVFRAME_*` environment variables, then an explicit
//! `--config` file, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use csvframe_engine::EngineOptions;
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, OutputFormat};

const CONFIG_NAMES: [&str; 2] = ["csvframe.toml", ".csvframe.toml"];

/// Main configuration structure for csvframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input parsing
    pub csv: CsvConfig,
    /// Result output
    pub output: OutputConfig,
    /// Diagnostics
    pub debug: DebugConfig,
}

/// How input files are parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Field separator, a single character or `tab`
    pub separator: String,
    /// Whether files have a header line
    pub has_header: bool,
    /// Quote character; empty disables quoting
    pub quote_char: String,
    /// Rows scanned for type inference, 0 scans every row
    pub infer_schema_length: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            separator: ",".to_string(),
            has_header: true,
            quote_char: "\"".to_string(),
            infer_schema_length: 1000,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default stdout format
    pub format: OutputFormat,
}

/// Debug and diagnostic configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// 0 warn, 1 info, 2 debug, 3+ trace
    pub verbosity: u8,
    /// Only report errors
    pub quiet: bool,
}

impl Config {
    /// Load configuration from the standard file locations and the environment
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = Self::find_config_file(None) {
            log::debug!("using config file {}", path.display());
            config.merge_file(&path)?;
        }
        config.merge_env_with_reader(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    /// First configuration file in the current directory, the user config
    /// directory or the home directory
    pub fn find_config_file(current_dir: Option<&Path>) -> Option<PathBuf> {
        let current = current_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut dirs_to_search = vec![current];
        if let Some(config_dir) = dirs::config_dir() {
            dirs_to_search.push(config_dir.join("csvframe"));
        }
        if let Some(home) = dirs::home_dir() {
            dirs_to_search.push(home);
        }

        dirs_to_search
            .iter()
            .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Merge a TOML configuration file into this one
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if extension != "toml" {
            bail!("Unsupported config file format: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML config {}", path.display()))?;
        self.merge(file_config);
        Ok(())
    }

    /// Merge `CSVFRAME_*` variables provided by `env_reader`
    ///
    /// Unparseable numeric values are ignored.
    pub fn merge_env_with_reader<F>(&mut self, env_reader: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = env_reader("CSVFRAME_SEPARATOR") {
            self.csv.separator = val;
        }
        if let Some(val) = env_reader("CSVFRAME_HAS_HEADER") {
            self.csv.has_header = is_truthy(&val);
        }
        if let Some(val) = env_reader("CSVFRAME_QUOTE_CHAR") {
            self.csv.quote_char = val;
        }
        if let Some(val) = env_reader("CSVFRAME_INFER_SCHEMA_LENGTH") {
            if let Ok(n) = val.parse() {
                self.csv.infer_schema_length = n;
            }
        }
        if let Some(val) = env_reader("CSVFRAME_FORMAT") {
            self.output.format = match val.to_lowercase().as_str() {
                "table" => OutputFormat::Table,
                "csv" => OutputFormat::Csv,
                "json" => OutputFormat::Json,
                other => bail!("Invalid CSVFRAME_FORMAT value: {other}"),
            };
        }
        if let Some(val) = env_reader("CSVFRAME_VERBOSITY") {
            if let Ok(level) = val.parse() {
                self.debug.verbosity = level;
            }
        }
        Ok(())
    }

    /// Override settings with command-line flags
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(sep) = &cli.separator {
            self.csv.separator.clone_from(sep);
        }
        if cli.no_header {
            self.csv.has_header = false;
        }
        if let Some(format) = cli.format {
            self.output.format = format;
        }
        if cli.verbose > 0 {
            self.debug.verbosity = cli.verbose;
        }
        if cli.quiet {
            self.debug.quiet = true;
        }
    }

    /// Parsing options for the SQLite engine
    pub fn to_engine_options(&self) -> Result<EngineOptions> {
        let separator = match self.csv.separator.as_str() {
            "tab" | "\\t" | "\t" => b'\t',
            sep => single_byte(sep).ok_or_else(|| {
                anyhow!("CSV separator must be a single character, got {sep:?}")
            })?,
        };
        let quote_char = if self.csv.quote_char.is_empty() {
            None
        } else {
            Some(single_byte(&self.csv.quote_char).ok_or_else(|| {
                anyhow!(
                    "CSV quote character must be a single character, got {:?}",
                    self.csv.quote_char
                )
            })?)
        };
        Ok(EngineOptions {
            separator,
            has_header: self.csv.has_header,
            quote_char,
            infer_schema_length: match self.csv.infer_schema_length {
                0 => None,
                n => Some(n),
            },
        })
    }

    /// Log level implied by verbosity and quiet mode
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug.quiet {
            return log::LevelFilter::Error;
        }
        match self.debug.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    fn merge(&mut self, other: Config) {
        let csv_defaults = CsvConfig::default();
        if other.csv.separator != csv_defaults.separator {
            self.csv.separator = other.csv.separator;
        }
        if other.csv.has_header != csv_defaults.has_header {
            self.csv.has_header = other.csv.has_header;
        }
        if other.csv.quote_char != csv_defaults.quote_char {
            self.csv.quote_char = other.csv.quote_char;
        }
        if other.csv.infer_schema_length != csv_defaults.infer_schema_length {
            self.csv.infer_schema_length = other.csv.infer_schema_length;
        }
        if other.output.format != OutputFormat::default() {
            self.output.format = other.output.format;
        }
        if other.debug.verbosity != 0 {
            self.debug.verbosity = other.debug.verbosity;
        }
        if other.debug.quiet {
            self.debug.quiet = true;
        }
    }
}

fn single_byte(s: &str) -> Option<u8> {
    match s.as_bytes() {
        [b] => Some(*b),
        _ => None,
    }
}

fn is_truthy(val: &str) -> bool {
    val != "0" && !val.eq_ignore_ascii_case("false")
}
