//! sqlgauge Common Library
//!
//! Shared types and utilities for the sqlgauge exporter crates:
//!
//! - [`client`] - Database client boundary (`DbClient`, `ColumnValue`, `DbClientError`)
//! - [`config`] - Database and logging configuration, YAML loading
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod error;

// Re-export commonly used types at the crate root
pub use client::{ColumnValue, DbClient, DbClientError, SharedDbClient};
pub use config::{DbConfig, LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two output
/// formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Logging(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
