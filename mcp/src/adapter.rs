//! Presents a remote tool as a local [`ToolExecutor`].

use std::sync::Arc;

use anvil_tools::{ToolCtx, ToolError, ToolExecutor, ToolFut};
use serde_json::Value;

use crate::client::McpClient;
use crate::protocol::RemoteTool;

/// A tool advertised by a protocol server.
///
/// Arguments are forwarded unchanged. A remote `isError` result or a protocol
/// failure becomes [`ToolError::ExecutionFailed`] carrying the remote text.
pub struct McpTool {
    client: Arc<McpClient>,
    descriptor: RemoteTool,
}

impl McpTool {
    #[must_use]
    pub fn new(client: Arc<McpClient>, descriptor: RemoteTool) -> Self {
        Self { client, descriptor }
    }

    #[must_use]
    pub fn descriptor(&self) -> &RemoteTool {
        &self.descriptor
    }
}

impl ToolExecutor for McpTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let name = self.descriptor.name.as_str();
            tracing::debug!(tool = name, call_id = %ctx.tool_call_id, "Calling remote tool");

            let result = self
                .client
                .call_tool(name, args)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool: name.to_string(),
                    message: e.to_string(),
                })?;

            let text = result.text();
            if result.is_error {
                return Err(ToolError::ExecutionFailed {
                    tool: name.to_string(),
                    message: text,
                });
            }
            Ok(text)
        })
    }
}
