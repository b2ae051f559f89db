//! MySQL database client for sqlgauge.
//!
//! Implements [`sqlgauge_common::DbClient`] on top of `mysql_async`, keeping one
//! lazily created connection pool per target database.

pub mod client;

pub use client::MySqlClient;
