pub mod clock;
pub mod query;
pub mod sqlite;
pub mod store;

// Re-export commonly used items
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::query::{PeriodPredicate, PeriodQuery, QueryError, SqlValue, UserMatch, FOLD_CASE_FN, TRANSACTIONS_VIEW};
pub use crate::sqlite::{SqliteStore, StoreConfig};
pub use crate::store::{Row, SpendingStore, StoreError};
