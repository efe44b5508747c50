use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

/// Categories that never count as spending.
pub const EXCLUDED_CATEGORIES: [&str; 3] = ["Installment", "Payments", "Refunds & Returns"];

/// Rounds to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
	let factor = 10f64.powi(places);
	(value * factor).round() / factor
}

/// True for an empty user or the literal "all" (any casing).
pub fn is_all_users(user: &str) -> bool {
	let trimmed = user.trim();
	trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all")
}

// Dashboard filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
	#[default]
	Monthly,
	Yearly,
}

impl Period {
	pub fn as_str(&self) -> &'static str {
		match self {
			Period::Monthly => "monthly",
			Period::Yearly => "yearly",
		}
	}

	/// Case-insensitive parse; anything else is `None`.
	pub fn parse(raw: &str) -> Option<Self> {
		let raw = raw.trim();
		if raw.eq_ignore_ascii_case("monthly") {
			Some(Period::Monthly)
		} else if raw.eq_ignore_ascii_case("yearly") {
			Some(Period::Yearly)
		} else {
			None
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filters {
	#[serde(default)]
	pub period: Period,
	#[serde(default, deserialize_with = "empty_string_as_none")]
	pub month: Option<String>,
	#[serde(default, deserialize_with = "lenient_year")]
	pub year: Option<i32>,
	#[serde(default = "default_user")]
	pub user: String,
}

impl Default for Filters {
	fn default() -> Self {
		Self {
			period: Period::Monthly,
			month: None,
			year: None,
			user: default_user(),
		}
	}
}

impl Filters {
	/// The dashboard user, unless it means "everyone".
	pub fn user_filter(&self) -> Option<&str> {
		if is_all_users(&self.user) {
			None
		} else {
			Some(self.user.trim())
		}
	}
}

fn default_user() -> String {
	"all".to_string()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<String>::deserialize(deserializer)?;
	Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

// The dashboard sends the year as a number, a numeric string or "".
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;

	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Number(n)) => n
			.as_i64()
			.and_then(|y| i32::try_from(y).ok())
			.map(Some)
			.ok_or_else(|| D::Error::custom(format!("invalid year: {n}"))),
		Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
		Some(Value::String(s)) => s
			.trim()
			.parse::<i32>()
			.map(Some)
			.map_err(|_| D::Error::custom(format!("invalid year: {s}"))),
		Some(other) => Err(D::Error::custom(format!("invalid year: {other}"))),
	}
}

// Conversation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: Value,
	},
	ToolResult {
		tool_use_id: String,
		content: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
	pub role: Role,
	pub content: MessageContent,
}

impl ConversationMessage {
	pub fn user_text(text: impl Into<String>) -> Self {
		Self {
			role: Role::User,
			content: MessageContent::Text(text.into()),
		}
	}

	pub fn assistant_text(text: impl Into<String>) -> Self {
		Self {
			role: Role::Assistant,
			content: MessageContent::Text(text.into()),
		}
	}

	/// Assistant turn carrying the model's tool-use requests (and any text it emitted alongside).
	pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
		Self {
			role: Role::Assistant,
			content: MessageContent::Blocks(blocks),
		}
	}

	/// One user-role turn bundling every tool result of a model turn.
	pub fn tool_results(results: Vec<ToolResult>) -> Self {
		Self {
			role: Role::User,
			content: MessageContent::Blocks(results.into_iter().map(ToolResult::into_block).collect()),
		}
	}

	pub fn is_plain_user_text(&self) -> bool {
		self.role == Role::User && matches!(self.content, MessageContent::Text(_))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	pub arguments: Map<String, Value>,
}

impl ToolCall {
	pub fn to_block(&self) -> ContentBlock {
		ContentBlock::ToolUse {
			id: self.id.clone(),
			name: self.name.clone(),
			input: Value::Object(self.arguments.clone()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
	pub tool_call_id: String,
	pub payload: Value,
}

impl ToolResult {
	pub fn ok(tool_call_id: impl Into<String>, payload: Value) -> Self {
		Self {
			tool_call_id: tool_call_id.into(),
			payload,
		}
	}

	pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			tool_call_id: tool_call_id.into(),
			payload: json!({ "error": message.into() }),
		}
	}

	pub fn is_error(&self) -> bool {
		self.payload.get("error").is_some()
	}

	pub fn into_block(self) -> ContentBlock {
		let is_error = self.is_error().then_some(true);
		ContentBlock::ToolResult {
			tool_use_id: self.tool_call_id,
			content: self.payload.to_string(),
			is_error,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
	pub response: String,
	pub conversation_history: Vec<ConversationMessage>,
}

// Spending rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
	pub category: String,
	pub total: f64,
	pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantTotal {
	pub merchant: String,
	pub total: f64,
	pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonTotal {
	pub person: String,
	pub total: f64,
	pub transaction_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
	Over,
	Under,
	NoLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatusRow {
	pub category: String,
	pub spent: f64,
	pub budget_limit: Option<f64>,
	pub remaining: Option<f64>,
	pub percent_used: Option<f64>,
	pub status: BudgetStatus,
}

impl BudgetStatusRow {
	/// A limit that is missing or not positive means the category is unbudgeted.
	pub fn from_spend(category: impl Into<String>, spent: f64, limit: Option<f64>) -> Self {
		let category = category.into();
		match limit.filter(|l| *l > 0.0) {
			Some(limit) => Self {
				category,
				spent,
				budget_limit: Some(limit),
				remaining: Some(round_to(limit - spent, 2)),
				percent_used: Some(round_to(spent / limit * 100.0, 1)),
				status: if spent > limit { BudgetStatus::Over } else { BudgetStatus::Under },
			},
			None => Self {
				category,
				spent,
				budget_limit: limit,
				remaining: None,
				percent_used: None,
				status: BudgetStatus::NoLimit,
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
	pub month: String,
	pub total: f64,
	pub categories: Vec<CategoryTotal>,
}

impl MonthSummary {
	pub fn new(month: impl Into<String>, categories: Vec<CategoryTotal>) -> Self {
		let total = round_to(categories.iter().map(|c| c.total).sum(), 2);
		Self {
			month: month.into(),
			total,
			categories,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
	pub month_a: MonthSummary,
	pub month_b: MonthSummary,
	pub difference: f64,
	pub percent_change: Option<f64>,
}

impl ComparisonResult {
	pub fn new(month_a: MonthSummary, month_b: MonthSummary) -> Self {
		let difference = round_to(month_a.total - month_b.total, 2);
		let percent_change = if month_b.total == 0.0 {
			None
		} else {
			Some(round_to((month_a.total - month_b.total) / month_b.total * 100.0, 1))
		};
		Self {
			month_a,
			month_b,
			difference,
			percent_change,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
	pub transaction_date: String,
	pub merchant_name: String,
	pub amount: f64,
	pub spending_category: String,
	pub person: String,
	pub account_type: Option<String>,
}

// Admin models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimit {
	pub category_name: String,
	pub spending_limit: Option<f64>,
}

/// Composite key identifying a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionKey {
	pub transaction_date: String,
	pub merchant_name: String,
	pub amount: f64,
	pub person: String,
}

// Dashboard models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCategoryTotal {
	pub spending_category: String,
	pub amount: f64,
	pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
	pub total_amount: f64,
	pub transaction_count: i64,
	pub period: String,
	pub current_period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
	pub spending_category: String,
	pub total_amount: f64,
	pub transaction_count: i64,
	pub avg_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
	pub amount: f64,
	pub spending_category: String,
	pub transaction_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOption {
	pub value: String,
	pub label: String,
}

/// Months (newest first) and years that have spending rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailablePeriods {
	pub months: Vec<PeriodOption>,
	pub years: Vec<i32>,
}

/// Budget context for a category drill-down. The limit scales with the number
/// of distinct months the transactions span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitInfo {
	pub category: String,
	pub base_limit: Option<f64>,
	pub months_multiplier: i64,
	pub effective_limit: Option<f64>,
	pub total_spent: f64,
	pub difference: Option<f64>,
}

impl LimitInfo {
	pub fn new(category: impl Into<String>, base_limit: Option<f64>, months: i64, total_spent: f64) -> Self {
		let months_multiplier = months.max(1);
		let effective_limit = base_limit.map(|l| round_to(l * months_multiplier as f64, 2));
		Self {
			category: category.into(),
			base_limit,
			months_multiplier,
			effective_limit,
			total_spent,
			difference: effective_limit.map(|l| round_to(l - total_spent, 2)),
		}
	}
}

/// Transactions for one category, newest first. `limit_info` is absent when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryDrilldown {
	pub transactions: Vec<TransactionRow>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit_info: Option<LimitInfo>,
}
