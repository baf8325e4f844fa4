//! JSON-RPC over HTTP POST client for a tool server.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::McpError;
use crate::protocol::{
    CallToolResult, InitializeResult, ListToolsResult, METHOD_INITIALIZE, METHOD_INITIALIZED,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION, RemoteTool, RpcNotification,
    RpcRequest, RpcResponse, ServerInfo,
};

const CLIENT_NAME: &str = "anvil";
const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Talks to one server endpoint. Request ids start at 1 and increase for the
/// life of the instance.
#[derive(Debug)]
pub struct McpClient {
    endpoint: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
    initialized: AtomicBool,
    server_info: OnceLock<ServerInfo>,
}

impl McpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, McpError> {
        let endpoint = Url::parse(endpoint).map_err(|source| McpError::InvalidUrl {
            url: endpoint.to_string(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint,
            http,
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            server_info: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Server identity, once `initialize` has succeeded.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    /// Same origin as the endpoint with the path replaced by `/health`.
    #[must_use]
    pub fn health_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path("/health");
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Liveness probe. Any 2xx answer means the server is up.
    pub async fn probe(&self) -> Result<(), McpError> {
        let response = self.http.get(self.health_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status, response).await);
        }
        Ok(())
    }

    /// Handshake. Must succeed before tools can be listed or called.
    pub async fn initialize(&self) -> Result<ServerInfo, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let result: InitializeResult = decode(self.request(METHOD_INITIALIZE, Some(params)).await?)?;
        tracing::info!(
            endpoint = %self.endpoint,
            server = %result.server_info.name,
            server_version = %result.server_info.version,
            protocol = result.protocol_version.as_deref().unwrap_or("unknown"),
            "Tool server initialized"
        );

        // Some servers answer the notification with an error status; the
        // handshake has already succeeded by then.
        if let Err(e) = self.notify(METHOD_INITIALIZED, None).await {
            tracing::warn!(endpoint = %self.endpoint, "Initialized notification failed: {e}");
        }

        let info = result.server_info;
        let _ = self.server_info.set(info.clone());
        self.initialized.store(true, Ordering::Release);
        Ok(info)
    }

    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>, McpError> {
        self.ensure_initialized()?;
        let result: ListToolsResult =
            decode(self.request(METHOD_TOOLS_LIST, Some(json!({}))).await?)?;
        Ok(result.tools)
    }

    /// Invoke a remote tool. `null` arguments are sent as `{}`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.ensure_initialized()?;
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let params = json!({ "name": name, "arguments": arguments });
        decode(self.request(METHOD_TOOLS_CALL, Some(params)).await?)
    }

    fn ensure_initialized(&self) -> Result<(), McpError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(McpError::NotInitialized)
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(id, method, "Sending tool server request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status, response).await);
        }

        let body = response.text().await?;
        let parsed: RpcResponse = serde_json::from_str(&body)?;
        parsed.into_result(id)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcNotification::new(method, params))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status, response).await);
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    Ok(serde_json::from_value(value)?)
}

async fn http_status_error(status: reqwest::StatusCode, response: reqwest::Response) -> McpError {
    let body = response.text().await.unwrap_or_default();
    McpError::HttpStatus {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}
