use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use folio_core::config::LlmConfig;

use crate::provider::{ChatRequest, ChatResponse, LlmError, LlmProvider, ToolCall};

/// OpenAI-compatible chat-completions client.
///
/// Targets any endpoint speaking the `/v1/chat/completions` wire format; the
/// provider name is carried through errors so upstream failures identify
/// which dependency misbehaved.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    chat_path: String,
}

impl OpenAiClient {
    /// Build a client from config. The per-request timeout lives on the
    /// reqwest client so every call inherits it.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            provider_name: config.provider.clone(),
            chat_path: "/v1/chat/completions".to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = build_request_body(req);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %req.model, provider = %self.provider_name, "sending chat completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, provider = %self.provider_name, "chat completion error");
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp))
    }
}

pub(crate) fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    // The system prompt always leads; raw wire messages (tool loop turns)
    // take precedence over the plain string history.
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];
    match &req.raw_messages {
        Some(raw) => messages.extend(raw.iter().cloned()),
        None => {
            for m in &req.messages {
                messages.push(serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                }));
            }
        }
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

pub(crate) fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCall> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| {
            calls
                .iter()
                .map(|tc| {
                    // Arguments arrive as a JSON-encoded string.
                    let arguments: serde_json::Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_default();
                    ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();
    let tokens_used = resp
        .usage
        .as_ref()
        .map(|u| u.prompt_tokens + u.completion_tokens)
        .unwrap_or(0);

    ChatResponse {
        content,
        model: resp.model,
        tokens_used,
        stop_reason,
        tool_calls,
    }
}

// Chat-completions wire types.

#[derive(Deserialize)]
pub(crate) struct ApiResponse {
    pub(crate) model: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: ApiMessage,
    pub(crate) finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ApiMessage {
    pub(crate) content: Option<String>,
    pub(crate) tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
pub(crate) struct ApiToolCall {
    pub(crate) id: String,
    pub(crate) function: ApiFunction,
}

#[derive(Deserialize)]
pub(crate) struct ApiFunction {
    pub(crate) name: String,
    pub(crate) arguments: String,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
}
