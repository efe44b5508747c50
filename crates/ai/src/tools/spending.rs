use chrono::NaiveDate;
use database::{PeriodPredicate, PeriodQuery, SqlValue, UserMatch, TRANSACTIONS_VIEW};
use models::{BudgetStatusRow, CategoryTotal, ComparisonResult, MerchantTotal, MonthSummary, PersonTotal, TransactionRow};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{Tool, ToolContext, ToolError, ToolName};

const MERCHANT_ROW_CAP: i64 = 25;
const RECENT_DEFAULT_LIMIT: i64 = 15;
const RECENT_MAX_LIMIT: i64 = 50;

fn period_properties(with_user: bool) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "month".into(),
        json!({"type": "string", "description": "Month in YYYY-MM format (e.g. '2026-02')"}),
    );
    properties.insert(
        "year".into(),
        json!({"type": "integer", "description": "Year for yearly queries (e.g. 2026)"}),
    );
    properties.insert(
        "period".into(),
        json!({
            "type": "string",
            "enum": ["monthly", "yearly"],
            "description": "Whether to query a single month or full year"
        }),
    );
    if with_user {
        properties.insert(
            "user".into(),
            json!({"type": "string", "description": "Filter by person name, or omit for all users"}),
        );
    }
    properties
}

fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// A non-empty string argument. Numbers are accepted in their textual form.
fn string_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn run<T: DeserializeOwned>(ctx: &ToolContext, sql: &str, params: &[SqlValue]) -> Result<Vec<T>, ToolError> {
    ctx.store
        .query(sql, params)?
        .into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(ToolError::from))
        .collect()
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value)?)
}

fn category_totals(ctx: &ToolContext, predicate: PeriodPredicate) -> Result<Vec<CategoryTotal>, ToolError> {
    let (where_sql, params) = predicate.into_parts();
    let sql = format!(
        "SELECT spending_category AS category,
                ROUND(SUM(amount), 2) AS total,
                COUNT(*) AS transaction_count
           FROM {TRANSACTIONS_VIEW}
          WHERE {where_sql}
          GROUP BY spending_category
          ORDER BY total DESC, category"
    );
    run(ctx, &sql, &params)
}

pub struct SpendingByCategoryTool;

impl Tool for SpendingByCategoryTool {
    fn name(&self) -> ToolName {
        ToolName::SpendingByCategory
    }

    fn description(&self) -> &'static str {
        "Get total spending amounts grouped by category for a given time period. Use this to answer \
         questions like 'what are my top categories?' or 'how much did I spend on groceries?'"
    }

    fn input_schema(&self) -> Value {
        object_schema(period_properties(true), &["period"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let predicate = PeriodQuery::from_args(args).build(ctx.clock.as_ref())?;
        to_payload(&category_totals(ctx, predicate)?)
    }
}

pub struct MerchantSpendingTool;

impl Tool for MerchantSpendingTool {
    fn name(&self) -> ToolName {
        ToolName::MerchantSpending
    }

    fn description(&self) -> &'static str {
        "Get spending grouped by merchant/store name. Can search for a specific merchant. Use this \
         for questions like 'how much did I spend at Costco?' or 'what are my top merchants?'"
    }

    fn input_schema(&self) -> Value {
        let mut properties = period_properties(true);
        properties.insert(
            "merchant_search".into(),
            json!({
                "type": "string",
                "description": "Search term to filter merchants (case-insensitive partial match)"
            }),
        );
        object_schema(properties, &["period"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let mut predicate = PeriodQuery::from_args(args).build(ctx.clock.as_ref())?;
        if let Some(search) = string_arg(args, "merchant_search") {
            predicate.and_contains_ci("merchant_name", &search);
        }

        let (where_sql, mut params) = predicate.into_parts();
        params.push(SqlValue::Integer(MERCHANT_ROW_CAP));
        let sql = format!(
            "SELECT merchant_name AS merchant,
                    ROUND(SUM(amount), 2) AS total,
                    COUNT(*) AS transaction_count
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              GROUP BY merchant_name
              ORDER BY total DESC, merchant
              LIMIT ?"
        );
        let rows: Vec<MerchantTotal> = run(ctx, &sql, &params)?;
        to_payload(&rows)
    }
}

#[derive(Deserialize)]
struct CategorySpend {
    category: String,
    spent: f64,
    budget_limit: Option<f64>,
}

pub struct CategoryBudgetStatusTool;

impl Tool for CategoryBudgetStatusTool {
    fn name(&self) -> ToolName {
        ToolName::CategoryBudgetStatus
    }

    fn description(&self) -> &'static str {
        "Get budget limit vs actual spending for each category. Use this for questions like \
         'am I over budget?' or 'how much budget do I have left?'"
    }

    fn input_schema(&self) -> Value {
        object_schema(period_properties(true), &["period"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let (where_sql, params) = PeriodQuery::from_args(args)
            .build(ctx.clock.as_ref())?
            .into_parts();
        let sql = format!(
            "SELECT spending_category AS category,
                    ROUND(SUM(amount), 2) AS spent,
                    sc.spending_limit AS budget_limit
               FROM {TRANSACTIONS_VIEW} t
               LEFT JOIN spending_categories sc
                 ON LOWER(sc.category_name) = LOWER(t.spending_category)
              WHERE {where_sql}
              GROUP BY t.spending_category, sc.spending_limit
              ORDER BY spent DESC, category"
        );

        let rows: Vec<BudgetStatusRow> = run::<CategorySpend>(ctx, &sql, &params)?
            .into_iter()
            .map(|row| BudgetStatusRow::from_spend(row.category, row.spent, row.budget_limit))
            .collect();
        to_payload(&rows)
    }
}

pub struct SpendingComparisonTool;

impl Tool for SpendingComparisonTool {
    fn name(&self) -> ToolName {
        ToolName::SpendingComparison
    }

    fn description(&self) -> &'static str {
        "Compare spending between two time periods. Use this for questions like 'how does this \
         month compare to last month?' or 'am I spending more than January?'"
    }

    fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "month_a".into(),
            json!({"type": "string", "description": "First month in YYYY-MM format"}),
        );
        properties.insert(
            "month_b".into(),
            json!({"type": "string", "description": "Second month in YYYY-MM format"}),
        );
        properties.insert(
            "user".into(),
            json!({"type": "string", "description": "Filter by person name"}),
        );
        object_schema(properties, &["month_a", "month_b"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let month_a = string_arg(args, "month_a")
            .ok_or_else(|| ToolError::InvalidArguments("month_a is required".into()))?;
        let month_b = string_arg(args, "month_b")
            .ok_or_else(|| ToolError::InvalidArguments("month_b is required".into()))?;
        let user = string_arg(args, "user");

        let summarize = |month: String| -> Result<MonthSummary, ToolError> {
            let mut query = PeriodQuery::monthly(month.clone());
            query.user = user.clone();
            let categories = category_totals(ctx, query.build(ctx.clock.as_ref())?)?;
            Ok(MonthSummary::new(month, categories))
        };

        let summary_a = summarize(month_a)?;
        let summary_b = summarize(month_b)?;
        to_payload(&ComparisonResult::new(summary_a, summary_b))
    }
}

pub struct SpendingByPersonTool;

impl Tool for SpendingByPersonTool {
    fn name(&self) -> ToolName {
        ToolName::SpendingByPerson
    }

    fn description(&self) -> &'static str {
        "Get spending breakdown by person. Use this for questions like 'who spent the most?' or \
         'how much did each person spend?'"
    }

    fn input_schema(&self) -> Value {
        let mut properties = period_properties(false);
        properties.insert(
            "category".into(),
            json!({"type": "string", "description": "Optional category to filter by"}),
        );
        object_schema(properties, &["period"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        // Answers "who spent the most", so a user filter would defeat the purpose.
        let mut predicate = PeriodQuery::from_args(args)
            .without_user()
            .build(ctx.clock.as_ref())?;
        if let Some(category) = string_arg(args, "category") {
            predicate.and_equals_ci("spending_category", &category);
        }

        let (where_sql, params) = predicate.into_parts();
        let sql = format!(
            "SELECT person,
                    ROUND(SUM(amount), 2) AS total,
                    COUNT(*) AS transaction_count
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              GROUP BY person
              ORDER BY total DESC, person"
        );
        let rows: Vec<PersonTotal> = run(ctx, &sql, &params)?;
        to_payload(&rows)
    }
}

pub struct RecentTransactionsTool;

impl RecentTransactionsTool {
    fn limit(args: &Map<String, Value>) -> i64 {
        let requested = match args.get("limit") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        requested
            .unwrap_or(RECENT_DEFAULT_LIMIT)
            .clamp(1, RECENT_MAX_LIMIT)
    }
}

impl Tool for RecentTransactionsTool {
    fn name(&self) -> ToolName {
        ToolName::RecentTransactions
    }

    fn description(&self) -> &'static str {
        "Get individual recent transactions with details. Use this for questions like 'show me my \
         last 10 transactions' or 'what did I buy recently?'"
    }

    fn input_schema(&self) -> Value {
        let mut properties = period_properties(true);
        properties.insert(
            "category".into(),
            json!({"type": "string", "description": "Filter by spending category"}),
        );
        properties.insert(
            "merchant_search".into(),
            json!({"type": "string", "description": "Case-insensitive partial merchant name"}),
        );
        properties.insert(
            "limit".into(),
            json!({
                "type": "integer",
                "description": "Number of transactions to return (default 15, max 50)"
            }),
        );
        object_schema(properties, &["period"])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let mut predicate = PeriodQuery::from_args(args).build(ctx.clock.as_ref())?;
        if let Some(category) = string_arg(args, "category") {
            predicate.and_equals_ci("spending_category", &category);
        }
        if let Some(search) = string_arg(args, "merchant_search") {
            predicate.and_contains_ci("merchant_name", &search);
        }

        let (where_sql, mut params) = predicate.into_parts();
        params.push(SqlValue::Integer(Self::limit(args)));
        let sql = format!(
            "SELECT transaction_date, merchant_name, amount, spending_category, person, account_type
               FROM {TRANSACTIONS_VIEW}
              WHERE {where_sql}
              ORDER BY transaction_date DESC
              LIMIT ?"
        );

        let rows: Vec<TransactionRow> = run::<TransactionRow>(ctx, &sql, &params)?
            .into_iter()
            .map(|mut row| {
                row.transaction_date = iso_date(&row.transaction_date);
                row
            })
            .collect();
        to_payload(&rows)
    }
}

/// `2026-02-28 23:59:59` becomes `2026-02-28`; anything unparseable is passed through.
fn iso_date(raw: &str) -> String {
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .map(|day| day.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub struct LookupUsersTool;

impl Tool for LookupUsersTool {
    fn name(&self) -> ToolName {
        ToolName::LookupUsers
    }

    fn description(&self) -> &'static str {
        "Find people in the data by partial name. Use this when the user mentions someone by a \
         nickname or partial name before filtering other tools by that person."
    }

    fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "search".into(),
            json!({"type": "string", "description": "Partial name to search for (case-insensitive)"}),
        );
        object_schema(properties, &[])
    }

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError> {
        let search = string_arg(args, "search").unwrap_or_default();
        let mut predicate = PeriodPredicate::unbounded();
        predicate.and_person(&search, UserMatch::Substring);

        let (where_sql, params) = predicate.into_parts();
        let sql = format!(
            "SELECT DISTINCT person FROM {TRANSACTIONS_VIEW} WHERE {where_sql} ORDER BY person"
        );
        let rows = ctx.store.query(&sql, &params)?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{FixedClock, Row, SpendingStore, SqliteStore, StoreError};
    use models::{CategoryLimit, TransactionKey};
    use std::sync::Arc;

    fn txn(date: &str, merchant: &str, amount: f64, category: &str, person: &str) -> TransactionRow {
        TransactionRow {
            transaction_date: date.to_string(),
            merchant_name: merchant.to_string(),
            amount,
            spending_category: category.to_string(),
            person: person.to_string(),
            account_type: Some("credit".to_string()),
        }
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for row in [
            txn("2026-01-31", "Costco", 40.0, "Groceries", "Alice"),
            txn("2026-02-01", "Costco", 25.5, "Groceries", "Alice"),
            txn("2026-02-03", "Trader Joe's", 60.0, "Groceries", "Bob"),
            txn("2026-02-05", "Shell", 30.0, "Gas", "Bob"),
            txn("2026-02-14", "Visa", 500.0, "Payments", "Alice"),
            txn("2026-02-20", "Netflix", 15.99, "Entertainment", "Alice"),
            txn("2026-02-28 23:59:59", "Costco", 100.0, "Groceries", "Bob"),
            txn("2026-03-01", "Costco", 10.0, "Groceries", "Bob"),
            txn("2025-06-10", "Delta", 320.0, "Travel", "Alice"),
        ] {
            store.insert_transaction(&row).unwrap();
        }
        store
    }

    fn ctx_for(store: impl SpendingStore + 'static) -> ToolContext {
        ToolContext {
            store: Arc::new(store),
            clock: Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap())),
        }
    }

    fn ctx() -> ToolContext {
        ctx_for(seeded_store())
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    struct BrokenStore;

    impl SpendingStore for BrokenStore {
        fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
            Err(StoreError::Invalid("connection refused".into()))
        }

        fn update_transaction_category(&self, _key: &TransactionKey, _c: &str) -> Result<usize, StoreError> {
            Err(StoreError::Poisoned)
        }

        fn update_category_limit(&self, _c: &str, _l: f64) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        fn insert_category(&self, _c: &str, _l: f64) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        fn categories_with_limits(&self) -> Result<Vec<CategoryLimit>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn test_spending_by_category_orders_by_total() {
        let out = SpendingByCategoryTool
            .call(&args(json!({"period": "monthly", "month": "2026-02"})), &ctx())
            .unwrap();
        assert_eq!(
            out,
            json!([
                {"category": "Groceries", "total": 185.5, "transaction_count": 3},
                {"category": "Gas", "total": 30.0, "transaction_count": 1},
                {"category": "Entertainment", "total": 15.99, "transaction_count": 1},
            ])
        );
    }

    #[test]
    fn test_spending_by_category_for_user_and_year() {
        let ctx = ctx();
        let out = SpendingByCategoryTool
            .call(&args(json!({"period": "monthly", "month": "2026-02", "user": "alice"})), &ctx)
            .unwrap();
        let categories: Vec<&str> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["category"].as_str().unwrap())
            .collect();
        assert_eq!(categories, vec!["Groceries", "Entertainment"]);

        let out = SpendingByCategoryTool
            .call(&args(json!({"period": "yearly", "year": 2025})), &ctx)
            .unwrap();
        assert_eq!(out, json!([{"category": "Travel", "total": 320.0, "transaction_count": 1}]));
    }

    #[test]
    fn test_defaults_to_clock_month() {
        let out = SpendingByCategoryTool.call(&Map::new(), &ctx()).unwrap();
        assert_eq!(out.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_month_is_an_error() {
        let err = SpendingByCategoryTool
            .call(&args(json!({"period": "monthly", "month": "February"})), &ctx())
            .unwrap_err();
        assert!(matches!(err, ToolError::Query(_)));
    }

    #[test]
    fn test_merchant_search() {
        let out = MerchantSpendingTool
            .call(
                &args(json!({"period": "monthly", "month": "2026-02", "merchant_search": "COST"})),
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, json!([{"merchant": "Costco", "total": 125.5, "transaction_count": 2}]));
    }

    #[test]
    fn test_merchant_search_folds_non_ascii() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_transaction(&txn("2026-02-04", "CAFÉ ÉCLAIR", 12.0, "Dining", "Zoë"))
            .unwrap();
        let ctx = ctx_for(store);

        for search in ["CAFÉ", "café", "éclair", "crêpe"] {
            let out = MerchantSpendingTool
                .call(
                    &args(json!({"period": "monthly", "month": "2026-02", "merchant_search": search})),
                    &ctx,
                )
                .unwrap();
            let expected = if search == "crêpe" {
                json!([])
            } else {
                json!([{"merchant": "CAFÉ ÉCLAIR", "total": 12.0, "transaction_count": 1}])
            };
            assert_eq!(out, expected, "search {search:?}");
        }

        let out = LookupUsersTool.call(&args(json!({"search": "ZOË"})), &ctx).unwrap();
        assert_eq!(out, json!([{"person": "Zoë"}]));
    }

    #[test]
    fn test_merchant_rows_are_capped() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..30 {
            store
                .insert_transaction(&txn("2026-05-02", &format!("Shop {i:02}"), 1.0 + i as f64, "Shopping", "Ann"))
                .unwrap();
        }
        let out = MerchantSpendingTool
            .call(&args(json!({"period": "monthly", "month": "2026-05"})), &ctx_for(store))
            .unwrap();
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0]["merchant"], "Shop 29");
    }

    #[test]
    fn test_budget_status_joins_limits() {
        let store = seeded_store();
        store.insert_category("groceries", 150.0).unwrap();
        store.insert_category("Gas", 0.0).unwrap();

        let out = CategoryBudgetStatusTool
            .call(&args(json!({"period": "monthly", "month": "2026-02"})), &ctx_for(store))
            .unwrap();
        let rows: Vec<BudgetStatusRow> = serde_json::from_value(out.clone()).unwrap();

        assert_eq!(rows[0].category, "Groceries");
        assert_eq!(rows[0].remaining, Some(-35.5));
        assert_eq!(rows[0].percent_used, Some(123.7));
        assert_eq!(out[0]["status"], "over");

        assert_eq!(out[1]["category"], "Gas");
        assert_eq!(out[1]["status"], "no_limit");
        assert!(out[1]["remaining"].is_null());

        assert_eq!(out[2]["category"], "Entertainment");
        assert!(out[2]["budget_limit"].is_null());
        assert!(out[2]["percent_used"].is_null());
        assert_eq!(out[2]["status"], "no_limit");
    }

    #[test]
    fn test_comparison_against_empty_month() {
        let out = SpendingComparisonTool
            .call(&args(json!({"month_a": "2026-02", "month_b": "2026-04"})), &ctx())
            .unwrap();
        assert_eq!(out["month_a"]["total"], 231.49);
        assert_eq!(out["month_b"]["total"], 0.0);
        assert_eq!(out["month_b"]["categories"], json!([]));
        assert_eq!(out["difference"], 231.49);
        assert!(out["percent_change"].is_null());
    }

    #[test]
    fn test_comparison_percent_change() {
        let out = SpendingComparisonTool
            .call(&args(json!({"month_a": "2026-03", "month_b": "2026-01"})), &ctx())
            .unwrap();
        assert_eq!(out["difference"], -30.0);
        assert_eq!(out["percent_change"], -75.0);
    }

    #[test]
    fn test_comparison_requires_both_months() {
        let err = SpendingComparisonTool
            .call(&args(json!({"month_a": "2026-02"})), &ctx())
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: month_b is required");
    }

    #[test]
    fn test_by_person_ignores_user() {
        let ctx = ctx();
        let out = SpendingByPersonTool
            .call(&args(json!({"period": "monthly", "month": "2026-02", "user": "Alice"})), &ctx)
            .unwrap();
        assert_eq!(
            out,
            json!([
                {"person": "Bob", "total": 190.0, "transaction_count": 3},
                {"person": "Alice", "total": 41.49, "transaction_count": 2},
            ])
        );

        let out = SpendingByPersonTool
            .call(
                &args(json!({"period": "monthly", "month": "2026-02", "category": "groceries"})),
                &ctx,
            )
            .unwrap();
        assert_eq!(out[0]["total"], 160.0);
        assert_eq!(out[1]["total"], 25.5);
    }

    #[test]
    fn test_recent_transactions_newest_first() {
        let out = RecentTransactionsTool
            .call(&args(json!({"period": "monthly", "month": "2026-02", "limit": 2})), &ctx())
            .unwrap();
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["transaction_date"], "2026-02-28");
        assert_eq!(rows[0]["amount"], 100.0);
        assert_eq!(rows[1]["merchant_name"], "Netflix");
    }

    #[test]
    fn test_recent_transactions_filters() {
        let out = RecentTransactionsTool
            .call(
                &args(json!({
                    "period": "monthly",
                    "month": "2026-02",
                    "category": "GROCERIES",
                    "merchant_search": "trader"
                })),
                &ctx(),
            )
            .unwrap();
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["merchant_name"], "Trader Joe's");
    }

    #[test]
    fn test_recent_transactions_limit_is_clamped() {
        let store = SqliteStore::open_in_memory().unwrap();
        for day in 1..=28 {
            for merchant in ["Cafe", "Bakery", "Deli"] {
                let date = format!("2026-05-{day:02}");
                store.insert_transaction(&txn(&date, merchant, 4.0, "Dining", "Ann")).unwrap();
            }
        }
        let ctx = ctx_for(store);
        let count = |limit: Value| {
            RecentTransactionsTool
                .call(&args(json!({"period": "monthly", "month": "2026-05", "limit": limit})), &ctx)
                .unwrap()
                .as_array()
                .unwrap()
                .len()
        };

        assert_eq!(count(json!(500)), 50);
        assert_eq!(count(json!(0)), 1);
        assert_eq!(count(json!(-3)), 1);
        assert_eq!(count(json!("7")), 7);
        assert_eq!(count(json!(2.5)), 15);
        assert_eq!(count(Value::Null), 15);
    }

    #[test]
    fn test_lookup_users_by_partial_name() {
        let ctx = ctx();
        let out = LookupUsersTool.call(&args(json!({"search": "LI"})), &ctx).unwrap();
        assert_eq!(out, json!([{"person": "Alice"}]));

        let out = LookupUsersTool.call(&Map::new(), &ctx).unwrap();
        assert_eq!(out, json!([{"person": "Alice"}, {"person": "Bob"}]));
    }

    #[test]
    fn test_store_failure_is_a_tool_error() {
        let err = SpendingByCategoryTool
            .call(&args(json!({"period": "monthly"})), &ctx_for(BrokenStore))
            .unwrap_err();
        assert!(matches!(err, ToolError::Store(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(iso_date("2026-02-28 23:59:59"), "2026-02-28");
        assert_eq!(iso_date("2026-02-28T10:00:00Z"), "2026-02-28");
        assert_eq!(iso_date("yesterday"), "yesterday");
    }
}
