//! In-Memory Repository Adapter
//!
//! Implements the `DataRepository` port with canned rows per query. Used by
//! the demo binary and tests; queries can be made to fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::domain::ports::{DataRepository, Row};
use crate::error::{Error, Result};

/// Repository answering each query string with a fixed row set.
///
/// Unknown queries return no rows. Parameters are recorded but not bound.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: RwLock<HashMap<String, Vec<Row>>>,
    failing: RwLock<HashSet<String>>,
    executed: AtomicU64,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_rows`](Self::set_rows).
    pub fn with_rows(self, query: impl Into<String>, rows: Vec<Row>) -> Self {
        self.set_rows(query, rows);
        self
    }

    /// Replace the rows returned for `query`.
    pub fn set_rows(&self, query: impl Into<String>, rows: Vec<Row>) {
        self.rows.write().insert(query.into(), rows);
    }

    /// Make `query` fail until [`recover_query`](Self::recover_query).
    pub fn fail_query(&self, query: impl Into<String>) {
        self.failing.write().insert(query.into());
    }

    /// Stop failing `query`.
    pub fn recover_query(&self, query: &str) {
        self.failing.write().remove(query);
    }

    /// Number of `execute` calls so far.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataRepository for InMemoryRepository {
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.executed.fetch_add(1, Ordering::Relaxed);

        if self.failing.read().contains(query) {
            return Err(Error::Repository(format!("query failed: {}", query)));
        }

        let rows = self.rows.read().get(query).cloned().unwrap_or_default();
        debug!(params = params.len(), rows = rows.len(), "In-memory query executed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_canned_rows() {
        let repo = InMemoryRepository::new().with_rows("SELECT 1", vec![row(json!({"id": 1}))]);

        let rows = repo.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));

        assert!(repo.execute("SELECT 2", &[json!(5)]).await.unwrap().is_empty());
        assert_eq!(repo.executed(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = InMemoryRepository::new();
        repo.fail_query("SELECT 1");

        assert_matches!(repo.execute("SELECT 1", &[]).await, Err(Error::Repository(_)));

        repo.recover_query("SELECT 1");
        tokio_test::assert_ok!(repo.execute("SELECT 1", &[]).await);
    }

    #[tokio::test]
    async fn test_health_check_default() {
        assert!(InMemoryRepository::new().health_check().await.unwrap());
    }
}
