//! MySQL implementation of the [`DbClient`] boundary.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sqlgauge_common::{ColumnValue, DbClient, DbClientError, DbConfig};

/// MySQL client holding one connection pool per target database.
///
/// Pools are created lazily on first use and reused for every later
/// execution against the same database name.
pub struct MySqlClient {
    config: DbConfig,
    pools: Mutex<HashMap<String, Pool>>,
}

impl MySqlClient {
    /// Create a new client. No connection is opened until the first query.
    pub fn new(config: DbConfig) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            databases = config.databases.len(),
            "Using MySQL client"
        );

        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().len()
    }

    /// Get the pool for a database, creating it on first access.
    fn pool_for(&self, database: &str) -> Pool {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(database) {
            return pool.clone();
        }

        debug!(db = %database, "Creating connection pool");
        let pool = Pool::new(self.connection_opts(database));
        pools.insert(database.to_string(), pool.clone());
        pool
    }

    fn connection_opts(&self, database: &str) -> OptsBuilder {
        let mut pool_opts = PoolOpts::default();
        if let Some(constraints) = PoolConstraints::new(0, self.config.connection_limit) {
            pool_opts = pool_opts.with_constraints(constraints);
        }

        OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(self.config.pass.clone())
            .db_name(Some(database.to_string()))
            .pool_opts(pool_opts)
    }

    async fn query_rows(&self, statement: &str, database: &str) -> Result<Vec<Row>, DbClientError> {
        let pool = self.pool_for(database);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let run = async {
            let mut conn = pool.get_conn().await?;
            conn.query::<Row, _>(statement).await
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(DbClientError::execution(statement, e)),
            Err(_) => Err(DbClientError::execution(
                statement,
                format!("timed out after {}s", self.config.timeout_secs),
            )),
        }
    }

    /// Disconnect every pool. Called once on process shutdown.
    pub async fn close(&self) {
        let pools: Vec<(String, Pool)> = self.pools.lock().drain().collect();
        info!(pools = pools.len(), "Closing all MySQL connection pools");

        for (database, pool) in pools {
            if let Err(e) = pool.disconnect().await {
                warn!(db = %database, error = %e, "Failed to close connection pool");
            }
        }
    }
}

#[async_trait]
impl DbClient for MySqlClient {
    async fn execute(
        &self,
        statement: &str,
        value_columns: &[String],
        database: &str,
    ) -> Result<Vec<ColumnValue>, DbClientError> {
        let rows = self.query_rows(statement, database).await?;

        match rows.as_slice() {
            [] => {
                debug!(db = %database, statement = %statement, "No result row");
                Ok(Vec::new())
            }
            [row] => {
                let names: Vec<String> = row
                    .columns_ref()
                    .iter()
                    .map(|c| c.name_str().into_owned())
                    .collect();
                let values: Vec<Value> = (0..row.len())
                    .map(|i| row.as_ref(i).cloned().unwrap_or(Value::NULL))
                    .collect();
                extract_values(statement, &names, &values, value_columns)
            }
            _ => Err(DbClientError::MultipleRows {
                statement: statement.to_string(),
                count: rows.len(),
            }),
        }
    }
}

/// Translate one result row into the requested column values.
///
/// All-or-none: the first missing or unparsable column fails the whole row.
pub fn extract_values(
    statement: &str,
    names: &[String],
    values: &[Value],
    value_columns: &[String],
) -> Result<Vec<ColumnValue>, DbClientError> {
    value_columns
        .iter()
        .map(|column| {
            let value = names
                .iter()
                .position(|name| name == column)
                .and_then(|idx| values.get(idx))
                .ok_or_else(|| DbClientError::MissingColumn {
                    statement: statement.to_string(),
                    column: column.clone(),
                })?;

            parse_value(value)
                .map(|v| ColumnValue::new(column.clone(), v))
                .ok_or_else(|| DbClientError::ValueParse {
                    column: column.clone(),
                    value: display_value(value),
                })
        })
        .collect()
}

/// Interpret a MySQL value as a number.
pub fn parse_value(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::UInt(v) => Some(*v as f64),
        Value::Float(v) => Some(*v as f64),
        Value::Double(v) => Some(*v),
        Value::Bytes(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::NULL => "NULL".to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => format!("{:?}", other),
    }
}
