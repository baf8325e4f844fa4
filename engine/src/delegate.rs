//! Sub-agent delegation exposed as a tool.

use std::sync::Arc;

use anvil_providers::CompletionService;
use anvil_tools::{ToolCtx, ToolError, ToolExecutor, ToolFut, ToolRegistry};
use anvil_types::NonEmptyString;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::agent::{Agent, AgentSettings};
use crate::prompts::SUB_AGENT_PROMPT;

pub const DELEGATE: &str = "delegate";

#[derive(Debug, Deserialize)]
struct DelegateArgs {
    task: String,
}

/// Runs a fresh [`Agent`] per call with its own conversation and iteration
/// bound. The nested agent only sees `registry`, normally the read-only tools.
pub struct SubAgentTool {
    service: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    settings: AgentSettings,
}

impl SubAgentTool {
    #[must_use]
    pub fn new(
        service: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            service,
            registry,
            settings,
        }
    }
}

impl ToolExecutor for SubAgentTool {
    fn name(&self) -> &str {
        DELEGATE
    }

    fn description(&self) -> &str {
        "Hand a self-contained research question to a sub-agent with read-only tools and return its answer"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "The question or task for the sub-agent." }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: DelegateArgs =
                serde_json::from_value(args).map_err(|e| ToolError::BadArgs {
                    message: e.to_string(),
                })?;
            let task = NonEmptyString::new(typed.task).map_err(|_| ToolError::BadArgs {
                message: "task must not be empty".to_string(),
            })?;

            tracing::info!(parent_call = %ctx.tool_call_id, "Starting sub-agent");
            let mut agent = Agent::new(
                Arc::clone(&self.service),
                Arc::clone(&self.registry),
                SUB_AGENT_PROMPT.into(),
                ctx.clone(),
                self.settings,
            );
            let outcome = agent.run(task).await;
            tracing::info!(
                parent_call = %ctx.tool_call_id,
                iterations = agent.iterations(),
                ok = outcome.is_ok(),
                "Sub-agent finished"
            );

            outcome.map_err(|e| ToolError::ExecutionFailed {
                tool: DELEGATE.to_string(),
                message: e.to_string(),
            })
        })
    }
}
