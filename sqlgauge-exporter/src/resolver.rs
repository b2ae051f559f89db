//! Expansion of query definitions into per-database resolved queries.

use std::sync::Arc;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::config::QueryConfig;
use crate::mapping::metric_key;

/// Errors raised while resolving queries.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid dbPattern [{pattern}] for query [{query}]: {source}")]
    InvalidPattern {
        query: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A query bound to one target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    /// The shared query definition.
    pub definition: Arc<QueryConfig>,
    /// The targeted database.
    pub target: String,
}

impl ResolvedQuery {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn statement(&self) -> &str {
        &self.definition.statement
    }

    pub fn value_columns(&self) -> &[String] {
        &self.definition.value_columns
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.definition.interval_secs)
    }

    /// Metric key under which `column` of this query is exported.
    pub fn metric_key(&self, column: &str) -> String {
        metric_key(&self.definition.name, &self.target, column)
    }
}

/// Compile a database pattern, anchored to the full name and case-insensitive.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
}

/// Resolve one query against the database list, keeping the list order.
pub fn resolve(
    databases: &[String],
    query: &Arc<QueryConfig>,
) -> Result<Vec<ResolvedQuery>, ResolveError> {
    let pattern = query
        .db_pattern
        .as_deref()
        .map(|p| {
            compile_pattern(p).map_err(|source| ResolveError::InvalidPattern {
                query: query.name.clone(),
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()?;

    Ok(databases
        .iter()
        .filter(|db| pattern.as_ref().is_none_or(|re| re.is_match(db)))
        .map(|db| ResolvedQuery {
            definition: Arc::clone(query),
            target: db.clone(),
        })
        .collect())
}

/// Resolve every query, in configuration order.
pub fn resolve_all(
    databases: &[String],
    queries: &[Arc<QueryConfig>],
) -> Result<Vec<ResolvedQuery>, ResolveError> {
    let mut resolved = Vec::new();
    for query in queries {
        resolved.extend(resolve(databases, query)?);
    }
    Ok(resolved)
}
