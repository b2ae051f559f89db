//! Test helpers shared by the exporter integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use sqlgauge_common::{ColumnValue, DbClient, DbClientError, DbConfig};
use sqlgauge_exporter::{ExporterConfig, QueryConfig};

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub statement: String,
    pub value_columns: Vec<String>,
    pub database: String,
}

type Reply = Result<Vec<ColumnValue>, DbClientError>;

/// A client that replays scripted replies per database.
///
/// Replies are consumed in order; once a database's script is exhausted every
/// further call returns no row. Replies queued for a specific statement take
/// precedence over the database-wide script.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    statement_replies: Mutex<HashMap<(String, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every call until a permit is added to `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Queue a reply for `database`.
    pub fn reply(&self, database: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .entry(database.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a reply for `statement` executed against `database`.
    pub fn reply_to(&self, database: &str, statement: &str, reply: Reply) -> &Self {
        self.statement_replies
            .lock()
            .entry((database.to_string(), statement.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a single-value reply for `database`.
    pub fn value(&self, database: &str, column: &str, value: f64) -> &Self {
        self.reply(database, Ok(vec![ColumnValue::new(column, value)]))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, database: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.database == database)
            .count()
    }
}

#[async_trait]
impl DbClient for ScriptedClient {
    async fn execute(
        &self,
        statement: &str,
        value_columns: &[String],
        database: &str,
    ) -> Result<Vec<ColumnValue>, DbClientError> {
        self.calls.lock().push(Call {
            statement: statement.to_string(),
            value_columns: value_columns.to_vec(),
            database: database.to_string(),
        });

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| DbClientError::execution(statement, e))?
                .forget();
        }

        let key = (database.to_string(), statement.to_string());
        let scripted = self
            .statement_replies
            .lock()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        let reply = scripted.or_else(|| {
            self.replies
                .lock()
                .get_mut(database)
                .and_then(|queue| queue.pop_front())
        });
        reply.unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn mx_test_query() -> QueryConfig {
    QueryConfig::new(
        "mx_test",
        1,
        "SELECT count(1) AS count FROM foo",
        vec!["count".to_string()],
    )
}

pub fn config(databases: &[&str], queries: Vec<QueryConfig>) -> ExporterConfig {
    let mut db = DbConfig::new(
        "test.local",
        3306,
        "testuser",
        databases.iter().map(|d| d.to_string()).collect(),
    );
    db.pass = Some("testpass".to_string());
    ExporterConfig::new(db, queries)
}
