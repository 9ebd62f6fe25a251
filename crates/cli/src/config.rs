//! User configuration from ~/.launchinfo/config.toml

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default dump file name, relative to the working directory
pub const DEFAULT_DUMP_PATH: &str = "process_dump.txt";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output settings
    pub output: OutputConfig,
    /// Dump file settings
    pub dump: DumpConfig,
    /// Report sections
    pub analysis: AnalysisConfig,
    /// Key loop after the report
    pub interactive: InteractiveConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Use JSON output by default
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Where `--write` and the W key put the dump
    pub path: PathBuf,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DUMP_PATH),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub modules: bool,
    pub threads: bool,
    pub environment: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            modules: true,
            threads: true,
            environment: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InteractiveConfig {
    /// Always wait for keys after printing
    pub enabled: bool,
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".launchinfo").join("config.toml"))
}

/// Load configuration, falling back to defaults
pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_from(&path),
        _ => Config::default(),
    }
}

fn load_from(path: &Path) -> Config {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read config; using defaults");
            return Config::default();
        }
    };
    parse_config(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid config; using defaults");
        Config::default()
    })
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Generate a sample config file content
pub fn sample_config() -> &'static str {
    r#"# launchinfo configuration file
# Place this file at ~/.launchinfo/config.toml

[output]
# Use JSON output by default
json = false
# Disable colored output
no_color = false

[dump]
# File written by --write and the W key
path = "process_dump.txt"

[analysis]
# Sections included in reports and dumps
modules = true
threads = true
environment = true

[interactive]
# Wait for Q/W keys after printing the report
enabled = false
"#
}
