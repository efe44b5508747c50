use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use database::{
    Clock, PeriodPredicate, PeriodQuery, Row, SpendingStore, SqlValue, StoreError, TRANSACTIONS_VIEW,
};
use models::{
    AvailablePeriods, CategoryDrilldown, CategoryLimit, CategoryStats, LimitInfo, Period, PeriodCategoryTotal,
    PeriodOption, PeriodSummary, RawTransaction, TransactionKey, TransactionRow,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Data access for the HTTP routes.
/// Wraps the blocking store so handlers never block the runtime.
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn list_users(&self) -> Result<Vec<String>>;
    async fn categories_with_limits(&self) -> Result<Vec<CategoryLimit>>;
    async fn update_category_limit(&self, category_name: String, limit: f64) -> Result<()>;
    async fn create_category(&self, category_name: String, limit: f64) -> Result<()>;
    async fn update_transaction_category(&self, key: TransactionKey, new_category: String) -> Result<usize>;

    /// Per-category totals for the period plus a summary; the summary is `None` when
    /// the period has no spending.
    async fn period_totals(&self, query: PeriodQuery) -> Result<(Vec<PeriodCategoryTotal>, Option<PeriodSummary>)>;
    async fn category_stats(&self, query: PeriodQuery) -> Result<Vec<CategoryStats>>;
    async fn raw_transactions(&self, query: PeriodQuery) -> Result<Vec<RawTransaction>>;
    async fn available_periods(&self) -> Result<AvailablePeriods>;
    /// Every known category name, budgeted or seen in spending.
    async fn category_names(&self) -> Result<Vec<String>>;
    async fn category_transactions(&self, category: String, query: PeriodQuery) -> Result<CategoryDrilldown>;
}

/// Repository backed by any `SpendingStore`, one blocking task per call.
pub struct StoreRepository {
    store: Arc<dyn SpendingStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl StoreRepository {
    pub fn new(store: Arc<dyn SpendingStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self { store, clock, timeout }
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SpendingStore) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || op(store.as_ref()));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(ApiError::from),
            Ok(Err(join_error)) => Err(ApiError::Internal(join_error.to_string())),
            Err(_) => Err(ApiError::StoreTimeout),
        }
    }

    async fn select(&self, sql: String, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        self.run(move |store| store.query(&sql, &params)).await
    }

    /// The dashboard asks for "yearly" without a year to mean the current year.
    fn predicate(&self, mut query: PeriodQuery) -> Result<PeriodPredicate> {
        let yearly = query.period.as_deref().and_then(Period::parse) == Some(Period::Yearly);
        if yearly && query.year.is_none() {
            query.year = Some(self.clock.today().year().to_string());
        }
        Ok(query.build(self.clock.as_ref())?)
    }
}

fn decode<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(|e| ApiError::Internal(e.to_string())))
        .collect()
}

fn month_option(month: &str) -> Option<(PeriodOption, i32)> {
    let start = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let option = PeriodOption {
        value: month.to_string(),
        label: start.format("%B %Y").to_string(),
    };
    Some((option, start.year()))
}

#[async_trait]
impl BudgetRepository for StoreRepository {
    async fn list_users(&self) -> Result<Vec<String>> {
        let (where_sql, params) = PeriodPredicate::unbounded().into_parts();
        let sql = format!(
            "SELECT DISTINCT person FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql} AND TRIM(COALESCE(person, '')) <> ''
              ORDER BY person"
        );

        let rows = self.select(sql, params).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("person").and_then(|p| p.as_str()).map(String::from))
            .collect())
    }

    async fn categories_with_limits(&self) -> Result<Vec<CategoryLimit>> {
        self.run(|store| store.categories_with_limits()).await
    }

    async fn update_category_limit(&self, category_name: String, limit: f64) -> Result<()> {
        self.run(move |store| store.update_category_limit(&category_name, limit))
            .await
    }

    async fn create_category(&self, category_name: String, limit: f64) -> Result<()> {
        self.run(move |store| store.insert_category(&category_name, limit))
            .await
    }

    async fn update_transaction_category(&self, key: TransactionKey, new_category: String) -> Result<usize> {
        self.run(move |store| store.update_transaction_category(&key, &new_category))
            .await
    }

    async fn period_totals(&self, query: PeriodQuery) -> Result<(Vec<PeriodCategoryTotal>, Option<PeriodSummary>)> {
        let requested = query.period.clone().unwrap_or_else(|| Period::Monthly.as_str().to_string());
        let predicate = self.predicate(query)?;
        let label = predicate.period_label().unwrap_or_default();
        let (where_sql, params) = predicate.into_parts();

        let totals_sql = format!(
            "SELECT spending_category, ROUND(SUM(amount), 2) AS amount, ? AS period
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              GROUP BY spending_category
              ORDER BY amount DESC, spending_category"
        );
        let mut totals_params = vec![SqlValue::Text(label.clone())];
        totals_params.extend(params.iter().cloned());

        let summary_sql = format!(
            "SELECT ROUND(COALESCE(SUM(amount), 0), 2) AS total_amount, COUNT(*) AS transaction_count
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}"
        );

        let (totals, summary) = self
            .run(move |store| Ok((store.query(&totals_sql, &totals_params)?, store.query(&summary_sql, &params)?)))
            .await?;

        let data: Vec<PeriodCategoryTotal> = decode(totals)?;
        let summary = summary.into_iter().next().and_then(|row| {
            let count = row.get("transaction_count").and_then(Value::as_i64).unwrap_or(0);
            (count > 0).then(|| PeriodSummary {
                total_amount: row.get("total_amount").and_then(Value::as_f64).unwrap_or(0.0),
                transaction_count: count,
                period: requested,
                current_period: label,
            })
        });
        Ok((data, summary))
    }

    async fn category_stats(&self, query: PeriodQuery) -> Result<Vec<CategoryStats>> {
        let (where_sql, params) = self.predicate(query)?.into_parts();
        let sql = format!(
            "SELECT spending_category,
                    ROUND(SUM(amount), 2) AS total_amount,
                    COUNT(*) AS transaction_count,
                    ROUND(AVG(amount), 2) AS avg_amount
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              GROUP BY spending_category
              ORDER BY total_amount DESC, spending_category"
        );
        decode(self.select(sql, params).await?)
    }

    async fn raw_transactions(&self, query: PeriodQuery) -> Result<Vec<RawTransaction>> {
        let (where_sql, params) = self.predicate(query)?.into_parts();
        let sql = format!(
            "SELECT amount, spending_category, SUBSTR(transaction_date, 1, 10) AS transaction_date
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              ORDER BY transaction_date DESC"
        );
        decode(self.select(sql, params).await?)
    }

    async fn available_periods(&self) -> Result<AvailablePeriods> {
        let (where_sql, params) = PeriodPredicate::unbounded().into_parts();
        let sql = format!(
            "SELECT DISTINCT SUBSTR(transaction_date, 1, 7) AS month
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              ORDER BY month DESC"
        );

        let mut periods = AvailablePeriods::default();
        for row in self.select(sql, params).await? {
            let Some((option, year)) = row.get("month").and_then(Value::as_str).and_then(month_option) else {
                continue;
            };
            if periods.years.last() != Some(&year) {
                periods.years.push(year);
            }
            periods.months.push(option);
        }
        Ok(periods)
    }

    async fn category_names(&self) -> Result<Vec<String>> {
        let (where_sql, params) = PeriodPredicate::unbounded().into_parts();
        let sql = format!(
            "SELECT category_name AS name FROM spending_categories
             UNION
             SELECT spending_category AS name FROM {TRANSACTIONS_VIEW} WHERE {where_sql}
             ORDER BY name COLLATE NOCASE"
        );

        let rows = self.select(sql, params).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
            .collect())
    }

    async fn category_transactions(&self, category: String, query: PeriodQuery) -> Result<CategoryDrilldown> {
        let mut predicate = self.predicate(query)?;
        predicate.and_equals_ci("spending_category", &category);
        let (where_sql, params) = predicate.into_parts();

        let rows_sql = format!(
            "SELECT SUBSTR(transaction_date, 1, 10) AS transaction_date, merchant_name, amount,
                    spending_category, person, account_type
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              ORDER BY transaction_date DESC"
        );
        let totals_sql = format!(
            "SELECT ROUND(COALESCE(SUM(ABS(amount)), 0), 2) AS total_spent,
                    COUNT(DISTINCT SUBSTR(transaction_date, 1, 7)) AS months
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}"
        );
        let limit_sql = "SELECT spending_limit FROM spending_categories WHERE category_name = ?".to_string();
        let limit_params = vec![SqlValue::Text(category.clone())];

        let (rows, totals, limit) = self
            .run(move |store| {
                Ok((
                    store.query(&rows_sql, &params)?,
                    store.query(&totals_sql, &params)?,
                    store.query(&limit_sql, &limit_params)?,
                ))
            })
            .await?;

        let transactions: Vec<TransactionRow> = decode(rows)?;
        if transactions.is_empty() {
            return Ok(CategoryDrilldown::default());
        }

        let totals = totals.into_iter().next().unwrap_or_default();
        let total_spent = totals.get("total_spent").and_then(Value::as_f64).unwrap_or(0.0);
        let months = totals.get("months").and_then(Value::as_i64).unwrap_or(1);
        let base_limit = limit
            .into_iter()
            .next()
            .and_then(|row| row.get("spending_limit").and_then(Value::as_f64));

        Ok(CategoryDrilldown {
            transactions,
            limit_info: Some(LimitInfo::new(category, base_limit, months, total_spent)),
        })
    }
}
