//! Data tools the model may call mid-conversation.

mod spending;

pub use spending::{
    CategoryBudgetStatusTool, LookupUsersTool, MerchantSpendingTool, RecentTransactionsTool,
    SpendingByCategoryTool, SpendingByPersonTool, SpendingComparisonTool,
};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ai_client::ToolSchema;
use database::{Clock, QueryError, SpendingStore, StoreError};
use models::ToolResult;
use serde_json::{Map, Value};
use thiserror::Error;

/// Every tool this backend knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SpendingByCategory,
    MerchantSpending,
    CategoryBudgetStatus,
    SpendingComparison,
    SpendingByPerson,
    RecentTransactions,
    LookupUsers,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::SpendingByCategory,
        ToolName::MerchantSpending,
        ToolName::CategoryBudgetStatus,
        ToolName::SpendingComparison,
        ToolName::SpendingByPerson,
        ToolName::RecentTransactions,
        ToolName::LookupUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SpendingByCategory => "get_spending_by_category",
            ToolName::MerchantSpending => "get_merchant_spending",
            ToolName::CategoryBudgetStatus => "get_category_budget_status",
            ToolName::SpendingComparison => "get_spending_comparison",
            ToolName::SpendingByPerson => "get_spending_by_person",
            ToolName::RecentTransactions => "get_recent_transactions",
            ToolName::LookupUsers => "lookup_users",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| UnknownTool(name.to_string()))
    }
}

/// Errors a tool reports back to the model as `{error}` payloads.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Unexpected result shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

/// A tool crashed outright. Unlike `ToolError` this ends the turn.
#[derive(Debug, Error)]
#[error("Tool {tool} crashed: {reason}")]
pub struct DispatchError {
    pub tool: ToolName,
    pub reason: String,
}

/// What a handler gets to work with.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn SpendingStore>,
    pub clock: Arc<dyn Clock>,
}

/// A named, schema-described data operation.
///
/// `call` is blocking; the registry runs it on the blocking thread pool.
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// Tells the model when the tool is relevant.
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments.
    fn input_schema(&self) -> Value;

    fn call(&self, args: &Map<String, Value>, ctx: &ToolContext) -> Result<Value, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Registry with every built-in spending tool.
    pub fn new(store: Arc<dyn SpendingStore>, clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self::empty(store, clock);
        registry.register(Arc::new(SpendingByCategoryTool));
        registry.register(Arc::new(MerchantSpendingTool));
        registry.register(Arc::new(CategoryBudgetStatusTool));
        registry.register(Arc::new(SpendingComparisonTool));
        registry.register(Arc::new(SpendingByPersonTool));
        registry.register(Arc::new(RecentTransactionsTool));
        registry.register(Arc::new(LookupUsersTool));
        registry
    }

    pub fn empty(store: Arc<dyn SpendingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tools: HashMap::new(),
            ctx: ToolContext { store, clock },
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    /// Schemas in declaration order, so the model sees a stable tool list.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        ToolName::ALL
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.schema())
            .collect()
    }

    /// Runs one tool call on the blocking pool.
    ///
    /// Validation, store failures and timeouts come back as error payloads; only a
    /// panicking handler is an `Err`.
    pub async fn dispatch(
        &self,
        name: ToolName,
        call_id: &str,
        args: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolResult, DispatchError> {
        let Some(tool) = self.get(name) else {
            return Ok(ToolResult::error(call_id, UnknownTool(name.to_string()).to_string()));
        };

        let ctx = self.ctx.clone();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || tool.call(&args, &ctx));

        let outcome = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                return Err(DispatchError {
                    tool: name,
                    reason: join_error.to_string(),
                });
            }
            // The blocking query keeps running; its result is discarded.
            Err(_) => Err(ToolError::Timeout(timeout)),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(payload) => {
                tracing::info!(tool = %name, duration_ms, "Tool call succeeded");
                Ok(ToolResult::ok(call_id, payload))
            }
            Err(err) => {
                tracing::warn!(tool = %name, duration_ms, error = %err, "Tool call failed");
                Ok(ToolResult::error(call_id, err.to_string()))
            }
        }
    }
}
