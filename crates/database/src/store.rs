use models::{CategoryLimit, TransactionKey};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::SqlValue;

/// One result row, column name to primitive JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare store directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Invalid value: {0}")]
    Invalid(String),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

/// Relational read/write contract behind the spending tools and the admin routes.
///
/// Calls are blocking; async callers are expected to move them onto a blocking thread.
pub trait SpendingStore: Send + Sync {
    /// Runs a read query, binding `params` positionally to its `?` placeholders.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError>;

    /// Recategorises the transaction(s) matching the composite key. Returns rows touched.
    fn update_transaction_category(
        &self,
        key: &TransactionKey,
        new_category: &str,
    ) -> Result<usize, StoreError>;

    fn update_category_limit(&self, category_name: &str, limit: f64) -> Result<(), StoreError>;

    fn insert_category(&self, category_name: &str, limit: f64) -> Result<(), StoreError>;

    fn categories_with_limits(&self) -> Result<Vec<CategoryLimit>, StoreError>;
}
