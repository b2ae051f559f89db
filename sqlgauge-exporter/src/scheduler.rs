//! Per-query recurring execution.
//!
//! Every resolved query runs in its own tokio task. A task fires once after
//! the initial delay and then on a fixed period measured from its start, so a
//! slow execution shifts nothing but its own tick. The values of one row reach
//! the registry together. Errors are logged and counted; they never end a task.
//!
//! Stopping is signalled through a watch channel that each task checks before
//! every tick. A tick already executing when the signal arrives finishes and
//! its values are applied; no execution starts after the signal is seen.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use sqlgauge_common::SharedDbClient;

use crate::config::MAX_INTERVAL_SECS;
use crate::registry::{SharedRegistry, TickOutcome};
use crate::resolver::ResolvedQuery;

/// Default delay before the first tick of every task.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Longest period a task will wait between ticks.
const MAX_PERIOD: Duration = Duration::from_secs(MAX_INTERVAL_SECS);

/// Owns one recurring task per resolved query.
pub struct Scheduler {
    client: SharedDbClient,
    registry: SharedRegistry,
    initial_delay: Duration,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a scheduler that executes through `client` and reports into `registry`.
    pub fn new(client: SharedDbClient, registry: SharedRegistry) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            registry,
            initial_delay: DEFAULT_INITIAL_DELAY,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Override the delay before the first tick.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Start the recurring task for one resolved query.
    pub fn spawn(&self, query: ResolvedQuery) {
        let task = QueryTask {
            query,
            client: self.client.clone(),
            registry: self.registry.clone(),
        };
        let shutdown = self.shutdown.subscribe();
        let initial_delay = self.initial_delay;

        let handle = tokio::spawn(task.run(initial_delay, shutdown));
        self.tasks.lock().push(handle);
    }

    /// Signal every task to stop. Does not wait for in-flight ticks.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Number of tasks spawned so far.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Number of tasks that have not terminated yet.
    pub fn running_count(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// The recurring task of a single resolved query.
struct QueryTask {
    query: ResolvedQuery,
    client: SharedDbClient,
    registry: SharedRegistry,
}

impl QueryTask {
    async fn run(self, initial_delay: Duration, mut shutdown: watch::Receiver<bool>) {
        let period = self.query.interval();
        if period > MAX_PERIOD {
            warn!(
                query = %self.query.name(),
                db = %self.query.target,
                interval_secs = period.as_secs(),
                "Interval too long, clamping to {}s",
                MAX_PERIOD.as_secs()
            );
        }
        let period = period.min(MAX_PERIOD);
        let started = Instant::now();

        info!(
            query = %self.query.name(),
            db = %self.query.target,
            interval_secs = period.as_secs(),
            "Starting query scheduler"
        );

        let mut ticker = tokio::time::interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let initial = tokio::time::sleep_until(started + initial_delay);
        tokio::pin!(initial);
        let mut initial_done = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stopped| *stopped) => break,
                _ = &mut initial, if !initial_done => initial_done = true,
                _ = ticker.tick() => initial_done = true,
            }

            let outcome = self.tick().await;
            self.registry.record_tick(outcome);
        }

        info!(
            query = %self.query.name(),
            db = %self.query.target,
            "Query scheduler stopped"
        );
    }

    /// Execute the query once and route its values into the registry.
    async fn tick(&self) -> TickOutcome {
        let query = &self.query;
        let result = self
            .client
            .execute(query.statement(), query.value_columns(), &query.target)
            .await;

        let values = match result {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    query = %query.name(),
                    db = %query.target,
                    kind = e.kind(),
                    error = %e,
                    "Failed to execute query"
                );
                return TickOutcome::Failed;
            }
        };

        if values.is_empty() {
            debug!(query = %query.name(), db = %query.target, "No data returned");
            return TickOutcome::Skipped;
        }

        let row: Vec<(String, f64)> = values
            .iter()
            .map(|v| (query.metric_key(&v.column), v.value))
            .collect();

        if let Err(e) = self.registry.update_row(&query.target, &row) {
            warn!(
                query = %query.name(),
                db = %query.target,
                error = %e,
                "Failed to update gauges"
            );
            return TickOutcome::Failed;
        }

        let updated = row.len();
        debug!(query = %query.name(), db = %query.target, updated, "Tick completed");
        TickOutcome::Success { updated }
    }
}
