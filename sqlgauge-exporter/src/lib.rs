//! SQL gauge exporter.
//!
//! Runs configured SQL queries against a set of databases on a schedule and
//! exposes the returned values as Prometheus gauges via an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌───────────┐    ┌───────────┐    ┌──────────┐    ┌─────────────┐
//! │  Config  │───>│ Resolver  │───>│ Scheduler │───>│ DbClient │    │ HTTP Server │
//! │  (YAML)  │    │ (per db)  │    │ (1 task / │    └────┬─────┘    │ (/metrics)  │
//! └──────────┘    └───────────┘    │  query)   │         │          └──────▲──────┘
//!                                  └─────┬─────┘<────────┘                 │
//!                                        │         ┌──────────┐            │
//!                                        └────────>│ Registry │────────────┘
//!                                                  └──────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! sqlgauge-exporter --config conf/exporter.yaml
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod exporter;
pub mod http;
pub mod mapping;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod scheduler;

pub use config::{ExporterConfig, QueryConfig};
pub use exporter::{Exporter, ExporterError, SharedExporter};
pub use http::HttpServer;
pub use registry::{MetricRegistry, SharedRegistry, TickOutcome};
pub use resolver::{ResolvedQuery, resolve, resolve_all};
pub use scheduler::Scheduler;
