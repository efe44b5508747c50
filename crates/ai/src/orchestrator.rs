use std::sync::Arc;
use std::time::Duration;

use ai_client::{LanguageModel, ModelRequest, ModelResponse};
use database::Clock;
use models::{ConversationMessage, Filters, ToolCall, ToolResult, TurnResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::ConversationHistory;
use crate::injector::inject_defaults;
use crate::prompt::system_prompt;
use crate::tools::{DispatchError, ToolName, ToolRegistry};

/// Reply when the model keeps asking for tools and never answers.
pub const LOOP_EXHAUSTED_REPLY: &str = "I had trouble processing that question. Could you try rephrasing it?";

/// Stands in for a final answer with no text; the Messages API rejects empty assistant turns.
pub const EMPTY_ANSWER_REPLY: &str = "I don't have an answer for that. Could you rephrase the question?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model calls allowed per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            max_output_tokens: default_max_output_tokens(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_max_iterations() -> usize {
    5
}

fn default_history_limit() -> usize {
    20
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    10
}

/// Failures that end a turn early.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0:#}")]
    Model(anyhow::Error),

    #[error("model call timed out after {0:?}")]
    ModelTimeout(Duration),

    #[error(transparent)]
    ToolCrash(#[from] DispatchError),
}

/// Drives one conversation turn: model call, tool calls, repeat until the model answers.
pub struct ChatOrchestrator {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl ChatOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            registry,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answers `message` in the context of `history` and the dashboard `filters`.
    ///
    /// Never fails: a model error or crashed tool yields an apology together with
    /// the caller's `history` exactly as it was passed in.
    pub async fn process_message(
        &self,
        message: &str,
        history: &[ConversationMessage],
        filters: &Filters,
    ) -> TurnResponse {
        match self.run_turn(message, history, filters).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "Chat turn failed");
                TurnResponse {
                    response: format!("Sorry, I encountered an error: {err}"),
                    conversation_history: history.to_vec(),
                }
            }
        }
    }

    async fn run_turn(
        &self,
        message: &str,
        history: &[ConversationMessage],
        filters: &Filters,
    ) -> Result<TurnResponse, TurnError> {
        let mut transcript = ConversationHistory::from_messages(self.config.history_limit, history).into_vec();
        transcript.push(ConversationMessage::user_text(message));

        let tools = self.registry.schemas();

        for iteration in 1..=self.config.max_iterations {
            let request = ModelRequest {
                system: system_prompt(filters, self.clock.today()),
                tools: tools.clone(),
                messages: model_view(&transcript).to_vec(),
                max_output_tokens: self.config.max_output_tokens,
            };

            let response = self.call_model(&request).await?;

            if !response.wants_tools() {
                let mut text = response.joined_text();
                if text.trim().is_empty() {
                    tracing::warn!(iteration, "Model returned an empty answer");
                    text = EMPTY_ANSWER_REPLY.to_string();
                }
                tracing::info!(iteration, "Model produced final answer");
                transcript.push(ConversationMessage::assistant_text(text.clone()));
                return Ok(TurnResponse {
                    response: text,
                    conversation_history: self.capped(transcript),
                });
            }

            let calls = response.tool_calls();
            tracing::info!(iteration, tool_calls = calls.len(), "Model requested tools");
            transcript.push(ConversationMessage::assistant_blocks(response.content));

            // One at a time, in the order the model asked.
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.run_tool(call, filters).await?);
            }
            transcript.push(ConversationMessage::tool_results(results));
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Tool loop exhausted without a final answer"
        );
        Ok(TurnResponse {
            response: LOOP_EXHAUSTED_REPLY.to_string(),
            conversation_history: self.capped(transcript),
        })
    }

    async fn call_model(&self, request: &ModelRequest) -> Result<ModelResponse, TurnError> {
        let limit = Duration::from_secs(self.config.model_timeout_secs);
        tokio::time::timeout(limit, self.model.complete(request))
            .await
            .map_err(|_| TurnError::ModelTimeout(limit))?
            .map_err(TurnError::Model)
    }

    async fn run_tool(&self, call: ToolCall, filters: &Filters) -> Result<ToolResult, TurnError> {
        let name = match call.name.parse::<ToolName>() {
            Ok(name) => name,
            Err(unknown) => {
                tracing::warn!(tool = %call.name, "Model requested an unknown tool");
                return Ok(ToolResult::error(call.id, unknown.to_string()));
            }
        };

        let args = inject_defaults(name, &call.arguments, filters);
        tracing::debug!(tool = %name, args = ?args, "Dispatching tool call");

        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        Ok(self.registry.dispatch(name, &call.id, args, timeout).await?)
    }

    fn capped(&self, transcript: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        ConversationHistory::from_messages(self.config.history_limit, &transcript).into_vec()
    }
}

/// The slice of the transcript sent to the model.
///
/// A capped history can open mid tool exchange, so anything before the first plain
/// user message is left out.
fn model_view(transcript: &[ConversationMessage]) -> &[ConversationMessage] {
    let start = transcript
        .iter()
        .position(ConversationMessage::is_plain_user_text)
        .unwrap_or(transcript.len());
    &transcript[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolContext, ToolError};
    use ai_client::StopReason;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use database::{FixedClock, SqliteStore};
    use models::{ContentBlock, MessageContent, Period, Role, TransactionRow};
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<ModelResponse>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<anyhow::Result<ModelResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    struct StalledModel;

    #[async_trait]
    impl LanguageModel for StalledModel {
        async fn complete(&self, _request: &ModelRequest) -> anyhow::Result<ModelResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelResponse::text("too late"))
        }
    }

    struct CrashingTool;

    impl Tool for CrashingTool {
        fn name(&self) -> ToolName {
            ToolName::SpendingByPerson
        }

        fn description(&self) -> &'static str {
            "crashes"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        fn call(&self, _args: &Map<String, Value>, _ctx: &ToolContext) -> Result<Value, ToolError> {
            panic!("handler bug");
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()))
    }

    fn registry() -> ToolRegistry {
        let store = SqliteStore::open_in_memory().unwrap();
        for (date, merchant, amount, category, person) in [
            ("2026-02-01", "Costco", 25.5, "Groceries", "Alice"),
            ("2026-02-03", "Trader Joe's", 60.0, "Groceries", "Bob"),
            ("2026-02-20", "Netflix", 15.99, "Entertainment", "Alice"),
            ("2026-03-04", "Shell", 30.0, "Gas", "Alice"),
        ] {
            store
                .insert_transaction(&TransactionRow {
                    transaction_date: date.into(),
                    merchant_name: merchant.into(),
                    amount,
                    spending_category: category.into(),
                    person: person.into(),
                    account_type: None,
                })
                .unwrap();
        }
        ToolRegistry::new(Arc::new(store), clock())
    }

    fn orchestrator_with(model: Arc<dyn LanguageModel>, registry: ToolRegistry) -> ChatOrchestrator {
        ChatOrchestrator::new(model, Arc::new(registry), clock(), OrchestratorConfig::default())
    }

    fn orchestrator(model: Arc<dyn LanguageModel>) -> ChatOrchestrator {
        orchestrator_with(model, registry())
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn prior(turns: usize) -> Vec<ConversationMessage> {
        (0..turns)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationMessage::user_text(format!("question {i}"))
                } else {
                    ConversationMessage::assistant_text(format!("answer {i}"))
                }
            })
            .collect()
    }

    fn tool_result_blocks(message: &ConversationMessage) -> Vec<(String, Value, Option<bool>)> {
        assert_eq!(message.role, Role::User);
        match &message.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => (
                        tool_use_id.clone(),
                        serde_json::from_str(content).unwrap(),
                        *is_error,
                    ),
                    other => panic!("expected tool result, got {other:?}"),
                })
                .collect(),
            MessageContent::Text(text) => panic!("expected blocks, got text {text}"),
        }
    }

    fn alice_february() -> Filters {
        Filters {
            period: Period::Monthly,
            month: Some("2026-02".into()),
            year: None,
            user: "Alice".into(),
        }
    }

    #[tokio::test]
    async fn test_final_answer_on_first_call() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text("You spent $41.49."))]);
        let orchestrator = orchestrator(model.clone());

        let turn = orchestrator
            .process_message("How much did I spend?", &prior(4), &Filters::default())
            .await;

        assert_eq!(turn.response, "You spent $41.49.");
        assert_eq!(turn.conversation_history.len(), 6);
        assert_eq!(
            turn.conversation_history[4],
            ConversationMessage::user_text("How much did I spend?")
        );
        assert_eq!(
            turn.conversation_history[5],
            ConversationMessage::assistant_text("You spent $41.49.")
        );
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_capped_at_twenty() {
        for (given, expected) in [(18, 20), (19, 20), (30, 20)] {
            let model = ScriptedModel::new(vec![Ok(ModelResponse::text("ok"))]);
            let orchestrator = orchestrator(model.clone());

            let turn = orchestrator
                .process_message("next", &prior(given), &Filters::default())
                .await;
            assert_eq!(turn.conversation_history.len(), expected);
            assert_eq!(
                turn.conversation_history.last(),
                Some(&ConversationMessage::assistant_text("ok"))
            );

            // capped to 20 before use, plus the new question
            let sent = model.requests()[0].messages.len();
            assert!(sent <= 21);
        }
    }

    #[tokio::test]
    async fn test_request_carries_prompt_and_tools() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text("ok"))]);
        orchestrator(model.clone())
            .process_message("hi", &[], &alice_february())
            .await;

        let request = &model.requests()[0];
        assert!(request.system.contains("- Viewing: 2026-02 for Alice"));
        assert!(request.system.contains("Today's date: 2026-02-10"));
        assert_eq!(request.tools.len(), ToolName::ALL.len());
        assert_eq!(request.max_output_tokens, 1024);
        assert_eq!(request.messages, vec![ConversationMessage::user_text("hi")]);
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_result_and_continues() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::tool_use(vec![call("tu_1", "get_weather", json!({"city": "Paris"}))])),
            Ok(ModelResponse::text("I can only help with your budget.")),
        ]);
        let orchestrator = orchestrator(model.clone());

        let turn = orchestrator
            .process_message("weather?", &[], &Filters::default())
            .await;

        assert_eq!(turn.response, "I can only help with your budget.");
        assert_eq!(model.requests().len(), 2);

        let history = &turn.conversation_history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].role, Role::Assistant);

        let results = tool_result_blocks(&history[2]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "tu_1");
        assert_eq!(results[0].1, json!({"error": "Unknown tool: get_weather"}));
        assert_eq!(results[0].2, Some(true));
    }

    #[tokio::test]
    async fn test_dashboard_defaults_reach_the_tool() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::tool_use(vec![call("tu_1", "get_spending_by_category", json!({}))])),
            Ok(ModelResponse::text("done")),
        ]);
        let turn = orchestrator(model.clone())
            .process_message("top categories?", &[], &alice_february())
            .await;

        let results = tool_result_blocks(&turn.conversation_history[2]);
        assert_eq!(
            results[0].1,
            json!([
                {"category": "Groceries", "total": 25.5, "transaction_count": 1},
                {"category": "Entertainment", "total": 15.99, "transaction_count": 1},
            ])
        );
        assert_eq!(results[0].2, None);

        // the second request includes the tool exchange
        let second = &model.requests()[1];
        assert_eq!(second.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_multiple_calls_share_one_result_turn() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::tool_use(vec![
                call("a", "lookup_users", json!({"search": "bo"})),
                call("b", "get_spending_comparison", json!({"month_a": "2026-02"})),
            ])),
            Ok(ModelResponse::text("done")),
        ]);
        let turn = orchestrator(model)
            .process_message("compare", &[], &Filters::default())
            .await;

        let results = tool_result_blocks(&turn.conversation_history[2]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[0].1, json!([{"person": "Bob"}]));
        assert_eq!(results[1].0, "b");
        assert_eq!(results[1].1, json!({"error": "Invalid arguments: month_b is required"}));
    }

    #[tokio::test]
    async fn test_loop_gives_up_after_five_iterations() {
        let replies = (0..6)
            .map(|i| {
                Ok(ModelResponse::tool_use(vec![call(
                    &format!("tu_{i}"),
                    "lookup_users",
                    json!({}),
                )]))
            })
            .collect();
        let model = ScriptedModel::new(replies);
        let orchestrator = orchestrator(model.clone());

        let turn = orchestrator
            .process_message("loop forever", &prior(10), &Filters::default())
            .await;

        assert_eq!(turn.response, LOOP_EXHAUSTED_REPLY);
        assert_eq!(model.requests().len(), 5);
        assert_eq!(turn.conversation_history.len(), 20);
    }

    #[tokio::test]
    async fn test_model_failure_returns_original_history() {
        let history = prior(3);
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::tool_use(vec![call("tu_1", "lookup_users", json!({}))])),
            Err(anyhow!("upstream returned 529")),
        ]);

        let turn = orchestrator(model)
            .process_message("anything", &history, &Filters::default())
            .await;

        assert_eq!(turn.response, "Sorry, I encountered an error: upstream returned 529");
        assert_eq!(turn.conversation_history, history);
    }

    #[tokio::test]
    async fn test_original_history_is_not_capped_on_failure() {
        let history = prior(25);
        let model = ScriptedModel::new(vec![Err(anyhow!("bad key"))]);

        let turn = orchestrator(model)
            .process_message("anything", &history, &Filters::default())
            .await;
        assert_eq!(turn.conversation_history.len(), 25);
    }

    #[tokio::test]
    async fn test_crashing_tool_aborts_turn() {
        let mut registry = registry();
        registry.register(Arc::new(CrashingTool));
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::tool_use(vec![call("tu_1", "get_spending_by_person", json!({}))])),
            Ok(ModelResponse::text("unreachable")),
        ]);

        let turn = orchestrator_with(model.clone(), registry)
            .process_message("who spent most?", &prior(2), &Filters::default())
            .await;

        assert!(turn.response.starts_with("Sorry, I encountered an error: Tool get_spending_by_person crashed"));
        assert_eq!(turn.conversation_history, prior(2));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_aborts_turn() {
        let turn = orchestrator(Arc::new(StalledModel))
            .process_message("hello", &[], &Filters::default())
            .await;
        assert_eq!(
            turn.response,
            "Sorry, I encountered an error: model call timed out after 60s"
        );
        assert!(turn.conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_leading_orphans_not_sent_to_model() {
        let history = vec![
            ConversationMessage::tool_results(vec![ToolResult::ok("old", json!([]))]),
            ConversationMessage::assistant_text("stale answer"),
            ConversationMessage::user_text("earlier question"),
            ConversationMessage::assistant_text("earlier answer"),
        ];
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text("ok"))]);
        let turn = orchestrator(model.clone())
            .process_message("follow up", &history, &Filters::default())
            .await;

        let sent = &model.requests()[0].messages;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], ConversationMessage::user_text("earlier question"));

        // caller's copy keeps everything
        assert_eq!(turn.conversation_history.len(), 6);
        assert_eq!(turn.conversation_history[..4], history[..]);
    }

    #[tokio::test]
    async fn test_tool_use_stop_without_calls_is_final() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse {
            content: vec![ContentBlock::Text { text: "Here you go".into() }],
            stop_reason: StopReason::ToolUse,
        })]);
        let turn = orchestrator(model)
            .process_message("hi", &[], &Filters::default())
            .await;
        assert_eq!(turn.response, "Here you go");
    }

    #[tokio::test]
    async fn test_empty_answer_is_replaced() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse {
                content: Vec::new(),
                stop_reason: StopReason::EndTurn,
            }),
            Ok(ModelResponse::text("  \n")),
        ]);
        let orchestrator = orchestrator(model.clone());

        let first = orchestrator.process_message("hi", &[], &Filters::default()).await;
        assert_eq!(first.response, EMPTY_ANSWER_REPLY);
        assert_eq!(
            first.conversation_history.last(),
            Some(&ConversationMessage::assistant_text(EMPTY_ANSWER_REPLY))
        );

        let second = orchestrator
            .process_message("again", &first.conversation_history, &Filters::default())
            .await;
        assert_eq!(second.response, EMPTY_ANSWER_REPLY);
        // the replayed assistant turn is never blank
        assert_eq!(
            model.requests()[1].messages[1],
            ConversationMessage::assistant_text(EMPTY_ANSWER_REPLY)
        );
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: OrchestratorConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.history_limit, 20);
    }
}
