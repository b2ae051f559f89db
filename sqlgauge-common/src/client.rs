//! Database client boundary used by the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single numeric value read from a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValue {
    /// Column name as requested in the query configuration.
    pub column: String,
    /// Parsed numeric value.
    pub value: f64,
}

impl ColumnValue {
    pub fn new(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// Errors a database client reports for a single execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbClientError {
    /// The statement could not be executed (connection, syntax, timeout, ...).
    #[error("Failed while executing [{statement}]: {message}")]
    Execution { statement: String, message: String },

    /// The statement returned more rows than the scalar contract allows.
    #[error("Only one row should be returned from [{statement}], but got {count}")]
    MultipleRows { statement: String, count: usize },

    /// A requested column is not part of the result set.
    #[error("Column [{column}] not found in result of [{statement}]")]
    MissingColumn { statement: String, column: String },

    /// A requested column holds a value that is not a number.
    #[error("Unexpected value [{value}] for column [{column}]")]
    ValueParse { column: String, value: String },
}

impl DbClientError {
    /// Create an execution error.
    pub fn execution(statement: impl Into<String>, message: impl ToString) -> Self {
        Self::Execution {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execution { .. } => "execution",
            Self::MultipleRows { .. } => "result_shape",
            Self::MissingColumn { .. } | Self::ValueParse { .. } => "value_parse",
        }
    }
}

/// Executes scalar statements against a named database.
///
/// Implementations return an empty vector when the statement yields no row,
/// and exactly one [`ColumnValue`] per requested column, in request order,
/// when it yields one row. Any other outcome is an error.
#[async_trait]
pub trait DbClient: Send + Sync {
    async fn execute(
        &self,
        statement: &str,
        value_columns: &[String],
        database: &str,
    ) -> Result<Vec<ColumnValue>, DbClientError>;
}

/// Shareable client handle.
pub type SharedDbClient = Arc<dyn DbClient>;
