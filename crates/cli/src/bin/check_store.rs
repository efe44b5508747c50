use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use database::{PeriodPredicate, SpendingStore, SqliteStore, TRANSACTIONS_VIEW};
use serde_json::Value;
use settings_loader::AppSettings;

#[derive(Parser, Debug)]
#[command(name = "check-store", about = "Verify the spending store opens and summarise its contents.")]
struct Args {
    /// Optional settings JSON; falls back to $SETTINGS_PATH
    #[arg(long)]
    settings: Option<PathBuf>,
}

struct Summary {
    transactions: i64,
    first_date: Option<String>,
    last_date: Option<String>,
    total_spending: f64,
    categories: Vec<String>,
}

fn summarize(store: &dyn SpendingStore) -> Result<Summary> {
    let totals = store
        .query(
            &format!(
                "SELECT COUNT(*) AS n, MIN(transaction_date) AS first_date, MAX(transaction_date) AS last_date
                   FROM {TRANSACTIONS_VIEW}"
            ),
            &[],
        )
        .context("counting transactions")?;
    let row = totals.first().cloned().unwrap_or_default();

    let (where_sql, params) = PeriodPredicate::unbounded().into_parts();
    let spending = store
        .query(
            &format!("SELECT ROUND(COALESCE(SUM(amount), 0), 2) AS total FROM {TRANSACTIONS_VIEW} WHERE {where_sql}"),
            &params,
        )
        .context("summing spending")?;

    let categories = store
        .query(
            &format!("SELECT DISTINCT spending_category AS category FROM {TRANSACTIONS_VIEW} ORDER BY category"),
            &[],
        )
        .context("listing categories")?;

    Ok(Summary {
        transactions: row.get("n").and_then(Value::as_i64).unwrap_or(0),
        first_date: row.get("first_date").and_then(Value::as_str).map(String::from),
        last_date: row.get("last_date").and_then(Value::as_str).map(String::from),
        total_spending: spending
            .first()
            .and_then(|r| r.get("total"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        categories: categories
            .iter()
            .filter_map(|r| r.get("category").and_then(Value::as_str).map(String::from))
            .collect(),
    })
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "database=info".into()),
        )
        .init();

    let args = Args::parse();
    let settings = AppSettings::load(args.settings.as_ref())?;
    let store = SqliteStore::open(&settings.store)
        .with_context(|| format!("opening {}", settings.store.path.display()))?;

    let summary = summarize(&store)?;
    let limits = store.categories_with_limits().context("reading category limits")?;

    println!("[OK] Store: {}", settings.store.path.display());
    println!("Transactions: {}", summary.transactions);
    match (&summary.first_date, &summary.last_date) {
        (Some(first), Some(last)) => println!("Date range: {first} .. {last}"),
        _ => println!("Date range: (empty)"),
    }
    println!("Total spending: ${:.2}", summary.total_spending);
    println!("Categories ({}): {}", summary.categories.len(), summary.categories.join(", "));
    println!("Categories with limits: {}", limits.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::TransactionRow;

    #[test]
    fn test_summary_excludes_payments_from_spending() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (date, amount, category) in [("2026-01-05", 12.5, "Dining"), ("2026-02-07", 100.0, "Payments")] {
            store
                .insert_transaction(&TransactionRow {
                    transaction_date: date.into(),
                    merchant_name: "Somewhere".into(),
                    amount,
                    spending_category: category.into(),
                    person: "Ann".into(),
                    account_type: None,
                })
                .unwrap();
        }

        let summary = summarize(&store).unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.first_date.as_deref(), Some("2026-01-05"));
        assert_eq!(summary.last_date.as_deref(), Some("2026-02-07"));
        assert_eq!(summary.total_spending, 12.5);
        assert_eq!(summary.categories, vec!["Dining", "Payments"]);
    }

    #[test]
    fn test_summary_of_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        let summary = summarize(&store).unwrap();
        assert_eq!(summary.transactions, 0);
        assert!(summary.first_date.is_none());
        assert_eq!(summary.total_spending, 0.0);
    }
}
