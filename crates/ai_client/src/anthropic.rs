use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use models::{ContentBlock, ConversationMessage};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LanguageModel, ModelRequest, ModelResponse, StopReason, ToolSchema};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for talking to the Anthropic Messages API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelClientConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ModelClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ModelClientConfig {
    /// Loads config from env vars:
    /// - `ANTHROPIC_API_KEY`  (no default; the chat endpoint is disabled without it)
    /// - `ANTHROPIC_BASE_URL` (default: `https://api.anthropic.com`)
    /// - `ANTHROPIC_MODEL`    (default: `claude-sonnet-4-5-20250929`)
    /// - `MODEL_TIMEOUT_SECS` (default: `60`)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overrides fields with whichever env vars are set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as `apply_env`, reading values through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            self.model = model;
        }
        if let Some(secs) = lookup("MODEL_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.timeout_secs = secs;
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Minimal Messages API client with tool-use support.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: ModelClientConfig) -> Result<Self> {
        let base_url = validate_base_url(&config.base_url)?;
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY is not set"))?;

        let mut key_header =
            HeaderValue::from_str(api_key.trim()).context("ANTHROPIC_API_KEY is not a valid header value")?;
        key_header.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", key_header);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.model,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let endpoint = self
            .base_url
            .join("v1/messages")
            .context("Failed to build /v1/messages URL")?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            system: &request.system,
            tools: &request.tools,
            messages: &request.messages,
        };

        let response = self
            .http
            .post(endpoint.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("POST {endpoint} returned {status}: {detail}"));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        tracing::debug!(
            stop_reason = ?parsed.stop_reason,
            blocks = parsed.content.len(),
            "Model responded"
        );

        Ok(parsed.into_model_response())
    }
}

fn validate_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url).with_context(|| format!("Invalid ANTHROPIC_BASE_URL: {base_url}"))?;

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("ANTHROPIC_BASE_URL is missing a host"))?;
    let is_local = host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "[::1]";

    match url.scheme() {
        "https" => {}
        "http" if is_local => {}
        other => {
            return Err(anyhow!(
                "Refusing '{other}' ANTHROPIC_BASE_URL for non-local host '{host}' (use https)"
            ))
        }
    }

    Ok(url)
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    #[serde(skip_serializing_if = "<[ToolSchema]>::is_empty")]
    tools: &'a [ToolSchema],
    messages: &'a [ConversationMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn into_model_response(self) -> ModelResponse {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
                ResponseBlock::Other => None,
            })
            .collect();

        ModelResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
        }
    }
}
