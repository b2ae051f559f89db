use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Database connection settings shared by every configured query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    /// Database hostname or IP address.
    pub host: String,

    /// Database port.
    pub port: u16,

    /// User to authenticate as.
    pub user: String,

    /// Password, if the account has one.
    #[serde(default)]
    pub pass: Option<String>,

    /// Names of the databases queries may target.
    pub databases: Vec<String>,

    /// Maximum connections per database pool (default: 1).
    #[serde(default = "default_connection_limit")]
    pub connection_limit: usize,

    /// Per-execution timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_connection_limit() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

impl DbConfig {
    /// Create a config with default pool settings.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        databases: Vec<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            pass: None,
            databases,
            connection_limit: default_connection_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Check the settings that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(
                "Database hostname/ipaddress is required".to_string(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(Error::Config("Database user is required".to_string()));
        }
        if self.databases.is_empty() {
            return Err(Error::Config(
                "Targeted databases is required".to_string(),
            ));
        }
        if self.databases.iter().any(|db| db.trim().is_empty()) {
            return Err(Error::Config(
                "Database names must not be empty".to_string(),
            ));
        }
        if self.connection_limit == 0 {
            return Err(Error::Config(
                "connectionLimit must be > 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeoutSecs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Non-fatal findings, reported once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.pass.is_none() {
            warnings.push("No database password provided".to_string());
        }
        warnings
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in YAML format.
///
/// An unreadable file is [`Error::Io`], a file holding only whitespace is
/// [`Error::Config`] and malformed YAML is [`Error::Yaml`].
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    if content.trim().is_empty() {
        return Err(Error::Config(format!(
            "Config file '{}' is empty",
            path.display()
        )));
    }

    parse_config(&content)
}

/// Load a configuration from a YAML string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(serde_yaml::from_str(content)?)
}
