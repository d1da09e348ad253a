use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::core::db::OpenOptions;
use crate::core::{Result, SqlHostError};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub sqlite: Option<SqliteConfig>,
}

/// SQLite-related configuration. Unset keys fall back to [`OpenOptions::default`].
#[derive(Debug, Default, Deserialize)]
pub struct SqliteConfig {
    pub read_only: Option<bool>,
    pub create: Option<bool>,
    pub uri: Option<bool>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| SqlHostError::Config(e.to_string()))
    }

    /// Open flags for new connections.
    pub fn open_options(&self) -> OpenOptions {
        let defaults = OpenOptions::default();
        match &self.sqlite {
            Some(sqlite) => OpenOptions {
                read_only: sqlite.read_only.unwrap_or(defaults.read_only),
                create: sqlite.create.unwrap_or(defaults.create),
                uri: sqlite.uri.unwrap_or(defaults.uri),
            },
            None => defaults,
        }
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = sqlhost::config::load_config("sqlhost.toml").expect("Failed to load config");
/// println!("{:?}", config.open_options());
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}
