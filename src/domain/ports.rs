//! Domain Ports (Port/Adapter Pattern)
//!
//! The warming strategies read their working sets through [`DataRepository`];
//! the cache's own store port lives next to it in [`crate::cache`]
//! (`DistributedStore`).
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Warming strategies                            │
//! │        │ DataRepository::execute              │
//! └────────┼──────────────────────────────────────┘
//!          ▼
//! ┌───────────────────────────────────────────────┐
//! │ Adapters: InMemoryRepository, SQL backends    │
//! └───────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// One result row, column name -> value
pub type Row = Map<String, Value>;

/// Port for running read queries against the system of record.
///
/// # Example
///
/// ```ignore
/// struct PgRepository { pool: PgPool }
///
/// #[async_trait]
/// impl DataRepository for PgRepository {
///     async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
///         // Bind params positionally and map rows to JSON objects
///     }
/// }
/// ```
#[async_trait]
pub trait DataRepository: Send + Sync {
    /// Run `query` with positional `params`.
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Check if the repository is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Read a string column, accepting numbers as well
pub fn column_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_column_str() {
        let r = row(json!({"id": 7, "niveau": "CP", "active": true}));
        assert_eq!(column_str(&r, "id").as_deref(), Some("7"));
        assert_eq!(column_str(&r, "niveau").as_deref(), Some("CP"));
        assert_eq!(column_str(&r, "active"), None);
        assert_eq!(column_str(&r, "missing"), None);
    }
}
