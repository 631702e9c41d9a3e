use crate::core::db::{BufferingPolicy, ConnectOptions};
use crate::core::{Result, RowStreamError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// How fetched rows are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Key/value dump per row
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Top-level configuration structure parsed from a TOML file.
#[derive(Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Database file path, `file:` URI, or `:memory:`
    pub endpoint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Table read by the comparison
    pub table: String,
    #[serde(default)]
    pub default_policy: BufferingPolicy,
    #[serde(default)]
    pub output: OutputFormat,
}

impl Default for Config {
    /// Placeholder values; replace them through a config file.
    fn default() -> Self {
        Config {
            endpoint: "your_database.db".to_string(),
            username: "your_username".to_string(),
            password: "your_password".to_string(),
            table: "your_table".to_string(),
            default_policy: BufferingPolicy::default(),
            output: OutputFormat::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("table", &self.table)
            .field("default_policy", &self.default_policy)
            .field("output", &self.output)
            .finish()
    }
}

impl Config {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| RowStreamError::Config(e.to_string()))
    }

    /// Options for opening a connection to the configured endpoint.
    pub fn connection_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.endpoint.clone())
            .credentials(self.username.clone(), self.password.clone())
            .default_policy(self.default_policy)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// use rowstream::config::load_config;
///
/// let config = load_config("rowstream.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| RowStreamError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    Config::from_toml_str(&content)
}
