//! Completion service clients.
//!
//! The agent depends only on [`CompletionService`]; [`ChatCompletionsClient`]
//! is the shipped implementation for OpenAI-compatible Chat Completions
//! endpoints. Requests are non-streaming and retried per [`retry`].

mod chat;
pub mod retry;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anvil_types::{AssistantMessage, Message, ToolDefinition};

pub use chat::{ChatCompletionsClient, ChatCompletionsConfig};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// One model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTurn {
    pub message: AssistantMessage,
    /// Provider-reported stop reason, when present.
    pub finish_reason: Option<String>,
}

impl AssistantTurn {
    #[must_use]
    pub fn new(message: AssistantMessage) -> Self {
        Self {
            message,
            finish_reason: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed after {attempts} attempt(s): {source}")]
    Http {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to decode completion response: {0}")]
    Decode(String),
    #[error("completion response contained no choices")]
    EmptyResponse,
}

pub type CompletionFut<'a> =
    Pin<Box<dyn Future<Output = Result<AssistantTurn, ProviderError>> + Send + 'a>>;

/// A language-model endpoint that answers a conversation with one assistant turn.
pub trait CompletionService: Send + Sync {
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> CompletionFut<'a>;
}

pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .build()
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(mut body) => {
            if body.len() > MAX_ERROR_BODY_BYTES {
                let mut end = MAX_ERROR_BODY_BYTES;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
                body.push_str("...(truncated)");
            }
            body
        }
        Err(e) => format!("<failed to read error body: {e}>"),
    }
}
