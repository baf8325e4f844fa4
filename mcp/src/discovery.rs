//! Fail-soft tool discovery.

use std::sync::Arc;
use std::time::Duration;

use crate::McpError;
use crate::adapter::McpTool;
use crate::client::McpClient;

/// Probe, handshake and list tools on `server_url`.
///
/// Any failure is logged and yields an empty list, so a missing or broken
/// server never prevents the agent from starting.
pub async fn discover_tools(server_url: &str, timeout: Duration) -> Vec<McpTool> {
    match try_discover(server_url, timeout).await {
        Ok(tools) => {
            tracing::info!(
                server = server_url,
                count = tools.len(),
                "Discovered remote tools"
            );
            tools
        }
        Err(e) => {
            tracing::warn!(server = server_url, "Tool discovery failed: {e}");
            Vec::new()
        }
    }
}

async fn try_discover(server_url: &str, timeout: Duration) -> Result<Vec<McpTool>, McpError> {
    let client = Arc::new(McpClient::new(server_url, timeout)?);
    client.probe().await?;
    client.initialize().await?;
    let tools = client.list_tools().await?;
    Ok(tools
        .into_iter()
        .map(|descriptor| McpTool::new(Arc::clone(&client), descriptor))
        .collect())
}
