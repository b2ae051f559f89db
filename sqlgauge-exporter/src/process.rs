//! Resource usage of the exporter process itself.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

/// One reading of the process' resource usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSample {
    /// Resident set size in bytes.
    pub resident_memory_bytes: u64,
    /// Virtual memory size in bytes.
    pub virtual_memory_bytes: u64,
    /// User and system CPU time spent, in seconds.
    pub cpu_seconds: f64,
    /// Open file descriptors, where the platform reports them.
    pub open_fds: Option<u64>,
}

/// Samples the current process through `sysinfo`.
pub struct ProcessCollector {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessCollector {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!(error = e, "Process metrics unavailable"))
            .ok();

        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// Refresh and read the process' usage. `None` when the platform does
    /// not expose it.
    pub fn sample(&self) -> Option<ProcessSample> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = system.process(pid)?;
        Some(ProcessSample {
            resident_memory_bytes: process.memory(),
            virtual_memory_bytes: process.virtual_memory(),
            cpu_seconds: process.accumulated_cpu_time() as f64 / 1000.0,
            open_fds: process.open_files().map(|n| n as u64),
        })
    }
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_sample_current_process() {
        let collector = ProcessCollector::new();
        let sample = collector.sample().unwrap();

        assert!(sample.resident_memory_bytes > 0);
        assert!(sample.virtual_memory_bytes >= sample.resident_memory_bytes);
        assert!(sample.cpu_seconds >= 0.0);
        assert!(sample.open_fds.unwrap() > 0);
    }

    #[test]
    fn test_repeated_samples() {
        let collector = ProcessCollector::new();
        let first = collector.sample().unwrap();
        let second = collector.sample().unwrap();

        assert!(second.cpu_seconds >= first.cpu_seconds);
    }
}
