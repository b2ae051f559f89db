//! Configuration for the SQL gauge exporter.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sqlgauge_common::{DbConfig, LoggingConfig, load_config, parse_config};

use crate::resolver::compile_pattern;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] sqlgauge_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Largest accepted `intervalSecs` (about 136 years).
pub const MAX_INTERVAL_SECS: u64 = u32::MAX as u64;

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Database connection settings.
    pub db: DbConfig,

    /// Queries to schedule.
    pub queries: Vec<QueryConfig>,

    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Metric registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A SQL query whose result columns are exported as gauges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Name of the query, must be unique.
    pub name: String,

    /// Interval in seconds between executions.
    pub interval_secs: u64,

    /// SQL statement, expected to return at most one row.
    pub statement: String,

    /// Columns of the result row to export.
    pub value_columns: Vec<String>,

    /// Regular expression selecting the targeted databases (all when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_pattern: Option<String>,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Delay before the first execution of every query (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    250
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

/// Metric registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Maximum unique series (memory protection).
    #[serde(default = "default_max_series")]
    pub max_series: usize,
}

fn default_max_series() -> usize {
    100_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_series: default_max_series(),
        }
    }
}

/// Check that a config path names a YAML file.
pub fn validate_config_path(path: &str) -> Result<std::path::PathBuf, String> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("yaml") | Some("yml") => Ok(path.into()),
        _ => Err(format!(
            "config file must have a .yaml or .yml extension: {}",
            path
        )),
    }
}

impl ExporterConfig {
    /// Create a config with default HTTP, scheduler, registry and logging settings.
    pub fn new(db: DbConfig, queries: Vec<QueryConfig>) -> Self {
        Self {
            db,
            queries,
            http: HttpConfig::default(),
            scheduler: SchedulerConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.db
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let mut names = HashSet::new();
        for query in &self.queries {
            query.validate()?;
            if !names.insert(query.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Query name [{}] is not unique",
                    query.name
                )));
            }
        }

        if self.registry.max_series == 0 {
            return Err(ConfigError::Validation(
                "maxSeries must be > 0".to_string(),
            ));
        }

        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }

    /// Non-fatal findings, to be logged once tracing is initialized.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = self.db.warnings();
        if self.queries.is_empty() {
            warnings.push("No SQL query configured".to_string());
        }
        for query in self.queries.iter().filter(|q| q.value_columns.is_empty()) {
            warnings.push(format!(
                "Query [{}] has no valueColumns, nothing will be exported",
                query.name
            ));
        }
        warnings
    }
}

impl QueryConfig {
    /// Create a query that targets every database.
    pub fn new(
        name: impl Into<String>,
        interval_secs: u64,
        statement: impl Into<String>,
        value_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            interval_secs,
            statement: statement.into(),
            value_columns,
            db_pattern: None,
        }
    }

    /// Restrict the query to databases matching `pattern`.
    pub fn with_db_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.db_pattern = Some(pattern.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Query name is required and must be unique".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "Query [{}] intervalSecs must be positive integer",
                self.name
            )));
        }
        if self.interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Validation(format!(
                "Query [{}] intervalSecs must not exceed {}",
                self.name, MAX_INTERVAL_SECS
            )));
        }
        if self.statement.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Query [{}] statement is required",
                self.name
            )));
        }
        if let Some(pattern) = &self.db_pattern {
            compile_pattern(pattern).map_err(|e| {
                ConfigError::Validation(format!(
                    "Query [{}] has invalid dbPattern: {}",
                    self.name, e
                ))
            })?;
        }
        Ok(())
    }
}
