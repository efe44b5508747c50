//! Language-model call contract used by the chat orchestrator, plus the HTTP client
//! that fulfils it against the Anthropic Messages API.

mod anthropic;

pub use anthropic::{AnthropicClient, ModelClientConfig};

use anyhow::Result;
use async_trait::async_trait;
use models::{ContentBlock, ConversationMessage, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Everything the model sees on one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub tools: Vec<ToolSchema>,
    pub messages: Vec<ConversationMessage>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
        }
    }

    pub fn tool_use(calls: Vec<ToolCall>) -> Self {
        Self {
            content: calls.iter().map(ToolCall::to_block).collect(),
            stop_reason: StopReason::ToolUse,
        }
    }

    /// The model asked for tools and actually named at least one.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
            && self
                .content
                .iter()
                .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: match input {
                        Value::Object(map) => map.clone(),
                        _ => Map::new(),
                    },
                }),
                _ => None,
            })
            .collect()
    }

    /// All text segments, concatenated in order.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_calls_extracted_in_order() {
        let response = ModelResponse {
            content: vec![
                ContentBlock::Text { text: "Let me check.".into() },
                ContentBlock::ToolUse {
                    id: "a".into(),
                    name: "get_spending_by_category".into(),
                    input: json!({"period": "monthly"}),
                },
                ContentBlock::ToolUse {
                    id: "b".into(),
                    name: "lookup_users".into(),
                    input: json!("not an object"),
                },
            ],
            stop_reason: StopReason::ToolUse,
        };

        assert!(response.wants_tools());
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["period"], "monthly");
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn test_tool_use_stop_without_blocks_is_final() {
        let response = ModelResponse {
            content: vec![ContentBlock::Text { text: "done".into() }],
            stop_reason: StopReason::ToolUse,
        };
        assert!(!response.wants_tools());
    }

    #[test]
    fn test_joined_text() {
        let response = ModelResponse {
            content: vec![
                ContentBlock::Text { text: "You spent ".into() },
                ContentBlock::Text { text: "$12.00".into() },
            ],
            stop_reason: StopReason::EndTurn,
        };
        assert_eq!(response.joined_text(), "You spent $12.00");
    }

    #[test]
    fn test_unknown_stop_reason() {
        let reason: StopReason = serde_json::from_value(json!("pause_turn")).unwrap();
        assert_eq!(reason, StopReason::Other);
    }
}
