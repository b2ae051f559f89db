//! Exporter lifecycle: wires the resolver, scheduler and registry together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use sqlgauge_common::SharedDbClient;

use crate::config::{ExporterConfig, QueryConfig};
use crate::registry::{MetricRegistry, SharedRegistry};
use crate::resolver::{ResolveError, resolve_all};
use crate::scheduler::Scheduler;

/// Errors returned by [`Exporter::start`].
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Exporter already started")]
    AlreadyStarted,
}

/// Runs the configured queries and serves their latest values.
pub struct Exporter {
    databases: Vec<String>,
    queries: Vec<Arc<QueryConfig>>,
    registry: SharedRegistry,
    scheduler: Scheduler,
    started: AtomicBool,
}

impl Exporter {
    /// Create an exporter with its own registry. Nothing runs until [`start`](Self::start).
    pub fn new(config: &ExporterConfig, client: SharedDbClient) -> Self {
        let registry = Arc::new(MetricRegistry::new(config.registry.clone()));
        let scheduler = Scheduler::new(client, registry.clone()).with_initial_delay(
            Duration::from_millis(config.scheduler.initial_delay_ms),
        );

        Self {
            databases: config.db.databases.clone(),
            queries: config.queries.iter().cloned().map(Arc::new).collect(),
            registry,
            scheduler,
            started: AtomicBool::new(false),
        }
    }

    /// Resolve every query and start one scheduler task per resolved query.
    ///
    /// Returns the number of tasks started. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<usize, ExporterError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ExporterError::AlreadyStarted);
        }

        info!("Starting exporter schedulers...");
        let resolved = match resolve_all(&self.databases, &self.queries) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let count = resolved.len();
        for query in resolved {
            self.scheduler.spawn(query);
        }

        info!(
            queries = self.queries.len(),
            databases = self.databases.len(),
            tasks = count,
            "Exporter started"
        );
        Ok(count)
    }

    /// Signal all tasks to stop without waiting for in-flight ticks.
    pub fn stop(&self) {
        info!("Stopping exporter schedulers");
        self.scheduler.stop();
    }

    /// Current metrics in Prometheus exposition format.
    pub fn metrics(&self) -> String {
        self.registry.render()
    }

    /// Shared handle to this exporter's registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

/// Create a shareable exporter handle.
pub type SharedExporter = Arc<Exporter>;
