//! Client for external tool servers speaking JSON-RPC 2.0 over HTTP.
//!
//! - [`McpClient`] performs the `initialize` handshake, `tools/list` and
//!   `tools/call` against a single POST endpoint.
//! - [`discover_tools`] wraps the whole sequence behind a fail-soft boundary.
//! - [`McpTool`] adapts each advertised tool to [`anvil_tools::ToolExecutor`].

mod adapter;
mod client;
mod discovery;
pub mod protocol;

pub use adapter::McpTool;
pub use client::McpClient;
pub use discovery::discover_tools;
pub use protocol::{CallToolResult, ContentPart, RemoteTool, RpcError, ServerInfo};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("failed to decode server response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Rpc(RpcError),
    #[error("malformed JSON-RPC response: {0}")]
    MalformedResponse(String),
    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: String },
    #[error("client not initialized")]
    NotInitialized,
}
