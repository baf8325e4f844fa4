use std::time::Duration;

use anvil_types::{AssistantMessage, Message, ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{
    AssistantTurn, CompletionFut, CompletionService, ProviderError, http_client_with_timeout,
    read_capped_error_body,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ChatCompletionsConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}

/// Non-streaming client for OpenAI-compatible `/chat/completions`.
#[derive(Debug)]
pub struct ChatCompletionsClient {
    config: ChatCompletionsConfig,
    endpoint: String,
    http: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, ProviderError> {
        let http = http_client_with_timeout(config.timeout)
            .map_err(|source| ProviderError::Http {
                attempts: 0,
                source,
            })?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            config,
            endpoint,
            http,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<AssistantTurn, ProviderError> {
        let body = build_request_body(&self.config.model, messages, tools);
        let auth_header = self
            .config
            .api_key
            .as_deref()
            .map(|key| format!("Bearer {key}"));

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting completion"
        );

        let outcome = send_with_retry(
            || {
                let request = self.http.post(&self.endpoint).json(&body);
                match &auth_header {
                    Some(value) => request.header("Authorization", value),
                    None => request,
                }
            },
            &self.config.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status().as_u16();
                let body = read_capped_error_body(response).await;
                return Err(ProviderError::Api { status, body });
            }
            RetryOutcome::Transport { attempts, source } => {
                return Err(ProviderError::Http { attempts, source });
            }
        };

        let text = response.text().await.map_err(|source| ProviderError::Http {
            attempts: 1,
            source,
        })?;
        parse_response(&text)
    }
}

impl CompletionService for ChatCompletionsClient {
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> CompletionFut<'a> {
        Box::pin(self.send(messages, tools))
    }
}

fn message_json(message: &Message) -> Value {
    match message {
        Message::System(_) | Message::User(_) => json!({
            "role": message.role_str(),
            "content": message.content(),
        }),
        Message::Assistant(assistant) => {
            let mut value = json!({
                "role": "assistant",
                "content": assistant.content(),
            });
            if assistant.has_tool_calls() {
                if assistant.content().is_empty() {
                    value["content"] = Value::Null;
                }
                let calls: Vec<Value> = assistant
                    .tool_calls()
                    .iter()
                    .map(|call| {
                        let arguments = match &call.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": arguments },
                        })
                    })
                    .collect();
                value["tool_calls"] = Value::Array(calls);
            }
            value
        }
        Message::ToolResult(result) => json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        }),
    }
}

fn build_request_body(model: &str, messages: &[Message], tools: &[ToolDefinition]) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("model".to_string(), json!(model));
    body.insert(
        "messages".to_string(),
        Value::Array(messages.iter().map(message_json).collect()),
    );

    if !tools.is_empty() {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
        body.insert("tools".to_string(), Value::Array(tool_defs));
    }

    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Arguments normally arrive JSON-encoded in a string. A string that does not
/// parse is kept verbatim so the caller can report it.
fn parse_arguments(raw: Option<Value>) -> Value {
    match raw {
        None => Value::Null,
        Some(Value::String(text)) if text.trim().is_empty() => Value::Null,
        Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Some(other) => other,
    }
}

fn parse_response(text: &str) -> Result<AssistantTurn, ProviderError> {
    let response: ChatResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
            ToolCall::new(id, call.function.name, parse_arguments(call.function.arguments))
        })
        .collect();

    Ok(AssistantTurn {
        message: AssistantMessage::new(choice.message.content.unwrap_or_default(), tool_calls),
        finish_reason: choice.finish_reason,
    })
}
