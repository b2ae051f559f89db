//! SQL gauge exporter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use sqlgauge_common::init_tracing;
use sqlgauge_exporter::config::validate_config_path;
use sqlgauge_exporter::{Exporter, ExporterConfig, HttpServer};
use sqlgauge_mysql::MySqlClient;

/// Export SQL query results as Prometheus gauges.
#[derive(Parser, Debug)]
#[command(name = "sqlgauge-exporter")]
#[command(about = "Run SQL queries on a schedule and export the results as Prometheus gauges")]
#[command(version)]
struct Args {
    /// Path to exporter configuration file (YAML format).
    #[arg(short, long, value_parser = validate_config_path)]
    config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ExporterConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Override from CLI
    if let Some(listen) = args.listen {
        config.http.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!("{}", e))?;

    info!("Starting sqlgauge exporter");
    info!("Loaded configuration from {:?}", args.config);
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let listen_addr = config
        .http
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create components
    let client = Arc::new(MySqlClient::new(config.db.clone()));
    let exporter = Arc::new(Exporter::new(&config, client.clone()));
    let http_server = HttpServer::new(exporter.clone(), listen_addr, config.http.path.clone());

    exporter.start()?;

    // Start HTTP server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut http_task = tokio::spawn(http_server.run(shutdown_rx));

    // Wait for shutdown signal, or for the server to fail
    let server_failed = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            None
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        result = &mut http_task => Some(result),
    };

    exporter.stop();

    let outcome = match server_failed {
        Some(Ok(Ok(()))) => Ok(()),
        Some(Ok(Err(e))) => Err(e),
        Some(Err(e)) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
        None => {
            shutdown_tx.send_replace(true);
            if tokio::time::timeout(Duration::from_secs(5), &mut http_task)
                .await
                .is_err()
            {
                warn!("HTTP server did not stop in time");
            }
            Ok(())
        }
    };

    client.close().await;

    if let Err(e) = &outcome {
        error!("Exporter failed: {:#}", e);
    }

    let stats = exporter.registry().stats();
    info!(
        ticks_succeeded = stats.ticks_succeeded,
        ticks_skipped = stats.ticks_skipped,
        ticks_failed = stats.ticks_failed,
        series_count = exporter.registry().series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    outcome
}

/// Resolve when the process receives SIGTERM.
async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
