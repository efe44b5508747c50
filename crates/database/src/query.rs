//! Period/user row filters for the spending view.
//!
//! Every predicate produced here is a `WHERE` fragment with `?` placeholders plus the
//! values to bind, in order. Only column names and the fixed excluded-category list are
//! ever written into the SQL text.

use chrono::{Datelike, Months, NaiveDate};
use models::{is_all_users, Period, EXCLUDED_CATEGORIES};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::clock::Clock;

/// View every analytic query reads from.
pub const TRANSACTIONS_VIEW: &str = "transactions_view";

/// SQL function the store registers to lower-case text with full Unicode rules.
/// SQLite's own `LOWER` only folds ASCII.
pub const FOLD_CASE_FN: &str = "fold_case";

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Invalid year '{0}': expected a calendar year such as 2026")]
    InvalidYear(String),
}

/// How the person column is compared against a requested user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserMatch {
    #[default]
    Exact,
    Substring,
}

/// Raw period arguments as a tool call supplies them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodQuery {
    pub period: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub user: Option<String>,
    pub user_match: UserMatch,
}

impl PeriodQuery {
    pub fn monthly(month: impl Into<String>) -> Self {
        Self {
            period: Some(Period::Monthly.as_str().to_string()),
            month: Some(month.into()),
            ..Self::default()
        }
    }

    pub fn yearly(year: i32) -> Self {
        Self {
            period: Some(Period::Yearly.as_str().to_string()),
            year: Some(year.to_string()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn without_user(mut self) -> Self {
        self.user = None;
        self
    }

    /// Reads `period`, `month`, `year` and `user` out of tool arguments.
    ///
    /// Numbers are kept in their textual form so that `build` is the single place
    /// that decides whether a value is acceptable.
    pub fn from_args(args: &Map<String, Value>) -> Self {
        Self {
            period: text_arg(args, "period"),
            month: text_arg(args, "month"),
            year: text_arg(args, "year"),
            user: text_arg(args, "user"),
            user_match: UserMatch::Exact,
        }
    }

    /// Resolves the period into a half-open date range and assembles the predicate.
    pub fn build(&self, clock: &dyn Clock) -> Result<PeriodPredicate, QueryError> {
        let month = self.month.as_deref().map(parse_month).transpose()?;
        let year = self.year.as_deref().map(parse_year).transpose()?;

        // An absent period means monthly; an unrecognised one falls to the current month.
        let period = match self.period.as_deref() {
            None => Some(Period::Monthly),
            Some(raw) => Period::parse(raw),
        };

        let (start, end) = match (period, month, year) {
            (Some(Period::Monthly), Some(start), _) => (start, next_month(start)?),
            (Some(Period::Yearly), _, Some(year)) => year_bounds(year)?,
            _ => {
                let today = clock.today();
                let start = first_of_month(today);
                (start, next_month(start)?)
            }
        };

        let mut predicate = PeriodPredicate::excluding_non_spending();
        predicate.push_condition(
            "transaction_date >= ? AND transaction_date < ?",
            [iso(start), iso(end)],
        );
        predicate.range = Some((start, end));

        if let Some(user) = self.user.as_deref().filter(|u| !is_all_users(u)) {
            predicate.and_person(user, self.user_match);
        }

        Ok(predicate)
    }
}

/// A `WHERE` fragment and its positionally aligned parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodPredicate {
    conditions: Vec<String>,
    params: Vec<SqlValue>,
    range: Option<(NaiveDate, NaiveDate)>,
}

impl PeriodPredicate {
    /// No date range; still excludes non-spending categories.
    pub fn unbounded() -> Self {
        Self::excluding_non_spending()
    }

    fn excluding_non_spending() -> Self {
        let excluded = EXCLUDED_CATEGORIES
            .iter()
            .map(|c| format!("'{}'", c.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(",");

        Self {
            conditions: vec![format!("spending_category NOT IN ({excluded})")],
            params: Vec::new(),
            range: None,
        }
    }

    fn push_condition<I>(&mut self, condition: &str, params: I)
    where
        I: IntoIterator<Item = SqlValue>,
    {
        self.conditions.push(condition.to_string());
        self.params.extend(params);
    }

    /// Adds `LOWER(column) = LOWER(?)`.
    pub fn and_equals_ci(&mut self, column: &'static str, value: &str) {
        self.push_condition(
            &format!("LOWER({column}) = LOWER(?)"),
            [SqlValue::from(value)],
        );
    }

    /// Adds a case-insensitive substring match; `%` and `_` in `value` match literally.
    /// Folding goes through [`FOLD_CASE_FN`] so non-ASCII letters compare the same way
    /// on both sides.
    pub fn and_contains_ci(&mut self, column: &'static str, value: &str) {
        let escaped = value
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        self.push_condition(
            &format!("{FOLD_CASE_FN}({column}) LIKE ? ESCAPE '\\'"),
            [SqlValue::Text(format!("%{escaped}%"))],
        );
    }

    pub fn and_person(&mut self, user: &str, user_match: UserMatch) {
        match user_match {
            UserMatch::Exact => self.and_equals_ci("person", user.trim()),
            UserMatch::Substring => self.and_contains_ci("person", user.trim()),
        }
    }

    /// Resolved `[start, end)` dates; `None` for an unbounded predicate.
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range
    }

    /// "February 2026" for a month range, "2026" for a calendar year.
    pub fn period_label(&self) -> Option<String> {
        let (start, end) = self.range?;
        if next_month(start).ok() == Some(end) {
            Some(start.format("%B %Y").to_string())
        } else {
            Some(start.year().to_string())
        }
    }

    pub fn sql(&self) -> String {
        self.conditions.join(" AND ")
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql(), self.params)
    }
}

fn text_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_month(raw: &str) -> Result<NaiveDate, QueryError> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_digit());
    if !shaped {
        return Err(QueryError::InvalidMonth(raw.to_string()));
    }

    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidMonth(raw.to_string()))
}

fn parse_year(raw: &str) -> Result<i32, QueryError> {
    raw.parse::<i32>()
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| QueryError::InvalidYear(raw.to_string()))
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn next_month(start: NaiveDate) -> Result<NaiveDate, QueryError> {
    start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| QueryError::InvalidMonth(start.format("%Y-%m").to_string()))
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), QueryError> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1);
    start
        .zip(end)
        .ok_or_else(|| QueryError::InvalidYear(year.to_string()))
}

fn iso(date: NaiveDate) -> SqlValue {
    SqlValue::Text(date.format("%Y-%m-%d").to_string())
}
