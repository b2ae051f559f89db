//! Metric registry that stores gauge values and renders them for scraping.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{trace, warn};

use crate::config::RegistryConfig;
use crate::mapping::{escape_label_value, format_value};
use crate::process::ProcessCollector;

/// Prefix of the exporter's own series.
const SELF_PREFIX: &str = "sqlgauge_exporter";

/// Errors raised while updating the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Max series limit ({limit}) reached, refusing new metric {key}")]
    SeriesLimit { key: String, limit: usize },
}

/// A single gauge series: one metric key with its `db` label.
#[derive(Debug, Clone)]
pub struct GaugeEntry {
    /// The metric key.
    pub key: String,
    /// Value of the `db` label.
    pub target: String,
    /// Current value.
    pub value: f64,
    /// When this gauge was last set.
    pub last_updated: Instant,
}

/// How a single scheduler tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Values were returned and routed to the registry.
    Success { updated: usize },
    /// The query returned no row.
    Skipped,
    /// The query failed.
    Failed,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Ticks that returned values.
    pub ticks_succeeded: u64,
    /// Ticks that returned no row.
    pub ticks_skipped: u64,
    /// Ticks that failed.
    pub ticks_failed: u64,
    /// Gauge updates applied.
    pub updates_applied: u64,
    /// Gauge updates refused because of the series limit.
    pub updates_rejected: u64,
}

/// Thread-safe gauge registry, owned by one exporter instance.
pub struct MetricRegistry {
    /// Gauges indexed by metric key.
    gauges: RwLock<HashMap<String, GaugeEntry>>,
    /// Registry configuration.
    config: RegistryConfig,
    /// Statistics.
    stats: RwLock<RegistryStats>,
    /// Creation time, for uptime.
    started: Instant,
    /// Creation time as Unix seconds.
    start_time_secs: f64,
    /// Source of the process resource series.
    process: ProcessCollector,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let start_time_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Self {
            gauges: RwLock::new(HashMap::new()),
            config,
            stats: RwLock::new(RegistryStats::default()),
            started: Instant::now(),
            start_time_secs,
            process: ProcessCollector::new(),
        }
    }

    /// Set a gauge, creating it on first use.
    pub fn update(&self, key: &str, target: &str, value: f64) -> Result<(), RegistryError> {
        self.update_row(target, &[(key.to_string(), value)])
    }

    /// Set every gauge of one result row under a single write lock.
    ///
    /// The row is applied whole or not at all: if its new keys would push the
    /// registry past `max_series`, nothing is written.
    pub fn update_row(&self, target: &str, values: &[(String, f64)]) -> Result<(), RegistryError> {
        let mut gauges = self.gauges.write();

        let new_keys: Vec<&String> = values
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !gauges.contains_key(*key))
            .collect();
        if gauges.len() + new_keys.len() > self.config.max_series {
            let key = new_keys.first().map(|k| k.to_string()).unwrap_or_default();
            drop(gauges);
            self.stats.write().updates_rejected += values.len() as u64;

            warn!(
                max_series = self.config.max_series,
                key = %key,
                db = target,
                "Max series limit reached, dropping row"
            );
            return Err(RegistryError::SeriesLimit {
                key,
                limit: self.config.max_series,
            });
        }

        let now = Instant::now();
        for (key, value) in values {
            match gauges.get_mut(key) {
                Some(entry) => {
                    entry.target.clear();
                    entry.target.push_str(target);
                    entry.value = *value;
                    entry.last_updated = now;
                }
                None => {
                    gauges.insert(
                        key.clone(),
                        GaugeEntry {
                            key: key.clone(),
                            target: target.to_string(),
                            value: *value,
                            last_updated: now,
                        },
                    );
                }
            }
            trace!(key = %key, db = target, value = *value, "Gauge updated");
        }
        drop(gauges);

        self.stats.write().updates_applied += values.len() as u64;
        Ok(())
    }

    /// Count a finished tick.
    pub fn record_tick(&self, outcome: TickOutcome) {
        let mut stats = self.stats.write();
        match outcome {
            TickOutcome::Success { .. } => stats.ticks_succeeded += 1,
            TickOutcome::Skipped => stats.ticks_skipped += 1,
            TickOutcome::Failed => stats.ticks_failed += 1,
        }
    }

    /// Current value of a gauge, if it has ever been set.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.gauges.read().get(key).map(|g| g.value)
    }

    /// Get the current number of stored series.
    pub fn series_count(&self) -> usize {
        self.gauges.read().len()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }

    /// Render all gauges in Prometheus exposition format.
    pub fn render(&self) -> String {
        let gauges = self.gauges.read();
        let mut output = String::with_capacity(gauges.len() * 100 + 1024);

        let mut entries: Vec<&GaugeEntry> = gauges.values().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        for entry in entries {
            writeln!(output, "# HELP {} {}", entry.key, entry.key).ok();
            writeln!(output, "# TYPE {} gauge", entry.key).ok();
            writeln!(
                output,
                "{}{{db=\"{}\"}} {}",
                entry.key,
                escape_label_value(&entry.target),
                format_value(entry.value)
            )
            .ok();
        }

        let series = gauges.len();
        drop(gauges);
        self.render_self_metrics(&mut output, series);

        output
    }

    /// Append the exporter's own process and activity series.
    fn render_self_metrics(&self, output: &mut String, series: usize) {
        writeln!(output, "# TYPE process_start_time_seconds gauge").ok();
        writeln!(
            output,
            "process_start_time_seconds {}",
            format_value(self.start_time_secs.floor())
        )
        .ok();

        if let Some(sample) = self.process.sample() {
            let resident = sample.resident_memory_bytes as f64;
            let virtual_bytes = sample.virtual_memory_bytes as f64;
            for (name, kind, value) in [
                ("process_resident_memory_bytes", "gauge", resident),
                ("process_virtual_memory_bytes", "gauge", virtual_bytes),
                ("process_cpu_seconds_total", "counter", sample.cpu_seconds),
            ] {
                writeln!(output, "# TYPE {} {}", name, kind).ok();
                writeln!(output, "{} {}", name, format_value(value)).ok();
            }
            if let Some(fds) = sample.open_fds {
                writeln!(output, "# TYPE process_open_fds gauge").ok();
                writeln!(output, "process_open_fds {}", fds).ok();
            }
        }

        let stats = self.stats.read();

        writeln!(output, "# TYPE {}_uptime_seconds gauge", SELF_PREFIX).ok();
        writeln!(
            output,
            "{}_uptime_seconds {}",
            SELF_PREFIX,
            format_value(self.started.elapsed().as_secs_f64())
        )
        .ok();

        writeln!(output, "# TYPE {}_series_total gauge", SELF_PREFIX).ok();
        writeln!(output, "{}_series_total {}", SELF_PREFIX, series).ok();

        writeln!(output, "# TYPE {}_ticks_total counter", SELF_PREFIX).ok();
        for (outcome, count) in [
            ("success", stats.ticks_succeeded),
            ("skipped", stats.ticks_skipped),
            ("failed", stats.ticks_failed),
        ] {
            writeln!(
                output,
                "{}_ticks_total{{outcome=\"{}\"}} {}",
                SELF_PREFIX, outcome, count
            )
            .ok();
        }

        writeln!(output, "# TYPE {}_updates_total counter", SELF_PREFIX).ok();
        writeln!(
            output,
            "{}_updates_total {}",
            SELF_PREFIX, stats.updates_applied
        )
        .ok();

        writeln!(
            output,
            "# TYPE {}_updates_rejected_total counter",
            SELF_PREFIX
        )
        .ok();
        writeln!(
            output,
            "{}_updates_rejected_total {}",
            SELF_PREFIX, stats.updates_rejected
        )
        .ok();
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_render() {
        let registry = MetricRegistry::default();
        registry
            .update("mx_test_testschema_count", "testschema", 10.0)
            .unwrap();

        assert_eq!(registry.series_count(), 1);

        let output = registry.render();
        assert!(output.contains("# TYPE mx_test_testschema_count gauge"));
        assert!(output.contains("mx_test_testschema_count{db=\"testschema\"} 10\n"));
    }

    #[test]
    fn test_update_overwrites_value() {
        let registry = MetricRegistry::default();
        registry.update("q_db_count", "db", 10.0).unwrap();
        registry.update("q_db_count", "db", 99.0).unwrap();

        let output = registry.render();
        assert!(output.contains("q_db_count{db=\"db\"} 99"));
        assert!(!output.contains("q_db_count{db=\"db\"} 10"));
        assert_eq!(registry.series_count(), 1);
        assert_eq!(registry.value("q_db_count"), Some(99.0));
    }

    #[test]
    fn test_colliding_key_last_write_wins() {
        let registry = MetricRegistry::default();
        registry.update("a_b_c", "b", 1.0).unwrap();
        registry.update("a_b_c", "b_c", 2.0).unwrap();

        let output = registry.render();
        assert!(output.contains("a_b_c{db=\"b_c\"} 2"));
        assert_eq!(registry.series_count(), 1);
    }

    #[test]
    fn test_unknown_key_not_rendered() {
        let registry = MetricRegistry::default();
        assert_eq!(registry.value("mx_test_testschema_count"), None);
        assert!(!registry.render().contains("mx_test_testschema_count"));
    }

    #[test]
    fn test_render_sorted_by_key() {
        let registry = MetricRegistry::default();
        registry.update("q_db_max", "db", 66.0).unwrap();
        registry.update("q_db_min", "db", 10.0).unwrap();

        let output = registry.render();
        let max = output.find("q_db_max{").unwrap();
        let min = output.find("q_db_min{").unwrap();
        assert!(max < min);
    }

    #[test]
    fn test_label_value_escaped() {
        let registry = MetricRegistry::default();
        registry.update("q_x_v", "we\"ird", 1.5).unwrap();
        assert!(registry.render().contains("q_x_v{db=\"we\\\"ird\"} 1.5"));
    }

    #[test]
    fn test_max_series_limit() {
        let registry = MetricRegistry::new(RegistryConfig { max_series: 2 });

        for i in 0..5 {
            let result = registry.update(&format!("q_db{}_v", i), &format!("db{}", i), i as f64);
            assert_eq!(result.is_ok(), i < 2);
        }

        // Existing series stay updatable at the limit.
        assert!(registry.update("q_db0_v", "db0", 7.0).is_ok());

        assert_eq!(registry.series_count(), 2);
        assert_eq!(registry.stats().updates_rejected, 3);
        assert_eq!(registry.stats().updates_applied, 3);
    }

    fn row(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_update_row_applies_all_values() {
        let registry = MetricRegistry::default();
        registry
            .update_row("db", &row(&[("q_db_min", 10.0), ("q_db_max", 66.0)]))
            .unwrap();

        assert_eq!(registry.value("q_db_min"), Some(10.0));
        assert_eq!(registry.value("q_db_max"), Some(66.0));
        assert_eq!(registry.stats().updates_applied, 2);
    }

    #[test]
    fn test_update_row_rejected_whole_at_limit() {
        let registry = MetricRegistry::new(RegistryConfig { max_series: 3 });
        registry.update("q_db_count", "db", 1.0).unwrap();
        registry.update("q_db_min", "db", 1.0).unwrap();

        // Only one slot left: the row needs two new series.
        let err = registry
            .update_row(
                "db",
                &row(&[("q_db_min", 5.0), ("q_db_max", 9.0), ("q_db_avg", 7.0)]),
            )
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::SeriesLimit {
                key: "q_db_max".to_string(),
                limit: 3,
            }
        );
        assert_eq!(registry.value("q_db_min"), Some(1.0));
        assert_eq!(registry.value("q_db_max"), None);
        assert_eq!(registry.series_count(), 2);
        assert_eq!(registry.stats().updates_rejected, 3);

        // A row that fits in the remaining slot still goes through.
        registry
            .update_row("db", &row(&[("q_db_min", 5.0), ("q_db_max", 9.0)]))
            .unwrap();
        assert_eq!(registry.series_count(), 3);
    }

    #[test]
    fn test_render_never_shows_half_a_row() {
        let registry = Arc::new(MetricRegistry::default());
        registry
            .update_row("db", &row(&[("q_db_max", 0.0), ("q_db_min", 0.0)]))
            .unwrap();

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 1..=2000 {
                    let v = i as f64;
                    registry
                        .update_row("db", &row(&[("q_db_max", v), ("q_db_min", v)]))
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            let output = registry.render();
            let value_of = |key: &str| -> String {
                output
                    .lines()
                    .find(|l| l.starts_with(key))
                    .and_then(|l| l.rsplit(' ').next())
                    .unwrap()
                    .to_string()
            };
            assert_eq!(value_of("q_db_max{"), value_of("q_db_min{"));
        }

        writer.join().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_rendered() {
        let output = MetricRegistry::default().render();

        assert!(output.contains("# TYPE process_resident_memory_bytes gauge\n"));
        assert!(output.contains("# TYPE process_virtual_memory_bytes gauge\n"));
        assert!(output.contains("# TYPE process_cpu_seconds_total counter\n"));
        assert!(output.contains("# TYPE process_open_fds gauge\n"));

        let resident = output
            .lines()
            .find_map(|l| l.strip_prefix("process_resident_memory_bytes "))
            .unwrap();
        assert!(resident.parse::<f64>().unwrap() > 0.0);
    }

    #[test]
    fn test_self_metrics_rendered() {
        let registry = MetricRegistry::default();
        registry.record_tick(TickOutcome::Success { updated: 1 });
        registry.record_tick(TickOutcome::Failed);
        registry.record_tick(TickOutcome::Failed);

        let output = registry.render();
        assert!(output.contains("process_start_time_seconds "));
        assert!(output.contains("sqlgauge_exporter_series_total 0"));
        assert!(output.contains("sqlgauge_exporter_ticks_total{outcome=\"success\"} 1"));
        assert!(output.contains("sqlgauge_exporter_ticks_total{outcome=\"failed\"} 2"));
        assert!(output.contains("sqlgauge_exporter_ticks_total{outcome=\"skipped\"} 0"));
    }
}
