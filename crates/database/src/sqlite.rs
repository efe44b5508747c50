use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use models::{CategoryLimit, TransactionKey, TransactionRow};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::query::{SqlValue, FOLD_CASE_FN};
use crate::store::{Row, SpendingStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_date TEXT NOT NULL,
    merchant_name TEXT NOT NULL,
    amount REAL NOT NULL,
    spending_category TEXT NOT NULL,
    person TEXT NOT NULL,
    account_type TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions (transaction_date);

CREATE TABLE IF NOT EXISTS spending_categories (
    category_name TEXT PRIMARY KEY COLLATE NOCASE,
    spending_limit REAL
);

CREATE VIEW IF NOT EXISTS transactions_view AS
    SELECT transaction_date, merchant_name, amount, spending_category, person, account_type
    FROM transactions;
"#;

/// Where the store lives and how long a writer may wait on a locked database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.path == Path::new(":memory:")
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("database/budget.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
        })
    }
}

/// Unicode-aware lower-casing for substring search. Non-text input folds to NULL.
fn register_fold_case(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_lowercase()),
                _ => None,
            })
        },
    )
}

/// SQLite-backed spending store. One connection, serialised behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `config` and makes sure
    /// the tables and the `transactions_view` view exist.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(&config.path)?
        };

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        register_fold_case(&conn)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(path = %config.path.display(), "Spending store ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(&StoreConfig::in_memory())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Appends one transaction row. Used by imports and fixtures.
    pub fn insert_transaction(&self, txn: &TransactionRow) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transactions
                (transaction_date, merchant_name, amount, spending_category, person, account_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                txn.transaction_date,
                txn.merchant_name,
                txn.amount,
                txn.spending_category,
                txn.person,
                txn.account_type
            ],
        )?;
        Ok(())
    }
}

impl SpendingStore for SqliteStore {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut out = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                out.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            Ok(out)
        })?;

        let rows = rows.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(rows = rows.len(), "Store query finished");
        Ok(rows)
    }

    fn update_transaction_category(
        &self,
        key: &TransactionKey,
        new_category: &str,
    ) -> Result<usize, StoreError> {
        if new_category.trim().is_empty() {
            return Err(StoreError::Invalid("new category must not be empty".to_string()));
        }

        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE transactions
                SET spending_category = ?1
              WHERE date(transaction_date) = date(?2)
                AND merchant_name = ?3
                AND ABS(amount - ?4) < 0.005
                AND person = ?5",
            params![
                new_category.trim(),
                key.transaction_date,
                key.merchant_name,
                key.amount,
                key.person
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!(
                "transaction {} / {} / {} / {}",
                key.transaction_date, key.merchant_name, key.amount, key.person
            )));
        }

        tracing::info!(rows = updated, category = new_category, "Transaction category updated");
        Ok(updated)
    }

    fn update_category_limit(&self, category_name: &str, limit: f64) -> Result<(), StoreError> {
        validate_limit(limit)?;

        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE spending_categories SET spending_limit = ?1 WHERE category_name = ?2",
            params![limit, category_name.trim()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("category {category_name}")));
        }
        Ok(())
    }

    fn insert_category(&self, category_name: &str, limit: f64) -> Result<(), StoreError> {
        let name = category_name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("category name must not be empty".to_string()));
        }
        validate_limit(limit)?;

        let conn = self.lock()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT category_name FROM spending_categories WHERE category_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing) = existing {
            return Err(StoreError::Conflict(format!("category {existing}")));
        }

        conn.execute(
            "INSERT INTO spending_categories (category_name, spending_limit) VALUES (?1, ?2)",
            params![name, limit],
        )?;
        Ok(())
    }

    fn categories_with_limits(&self) -> Result<Vec<CategoryLimit>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT category_name, spending_limit FROM spending_categories ORDER BY category_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategoryLimit {
                category_name: row.get(0)?,
                spending_limit: row.get(1)?,
            })
        })?;
        let limits = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(limits)
    }
}

fn validate_limit(limit: f64) -> Result<(), StoreError> {
    if !limit.is_finite() || limit < 0.0 {
        return Err(StoreError::Invalid(format!("limit must be a non-negative number, got {limit}")));
    }
    Ok(())
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
