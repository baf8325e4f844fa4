//! Assembly of the confirmation gate, the tool registry and the agent.

use std::path::Path;
use std::sync::Arc;

use anvil_mcp::discover_tools;
use anvil_providers::CompletionService;
use anvil_tools::builtins::{register_builtins, register_read_only};
use anvil_tools::confirmation::{
    BraveConfirmation, CommandDiffViewer, ConfirmationHandler, ConfirmationMode,
    ConfirmationSession, DenyCommandPattern, InteractiveConfirmation, PromptSurface,
    SafeConfirmation,
};
use anvil_tools::{ToolCtx, ToolError, ToolExecutor, ToolRegistry, detect_shell};
use anvil_types::NonEmptyString;

use crate::agent::{Agent, AgentSettings};
use crate::config::{AgentConfig, ConfirmationSection};
use crate::delegate::SubAgentTool;
use crate::prompts::SYSTEM_PROMPT;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid deny_command_patterns entry '{pattern}': {source}")]
    InvalidDenyPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Build the gate for `mode`. `surface` is only used by the interactive policy.
pub fn build_confirmation(
    mode: ConfirmationMode,
    section: &ConfirmationSection,
    surface: Box<dyn PromptSurface>,
) -> Result<Arc<dyn ConfirmationHandler>, SetupError> {
    let gate: Arc<dyn ConfirmationHandler> = match mode {
        ConfirmationMode::Brave => Arc::new(BraveConfirmation),
        ConfirmationMode::Safe => {
            let mut gate = SafeConfirmation::new();
            for pattern in &section.deny_command_patterns {
                let rule = DenyCommandPattern::new(pattern).map_err(|source| {
                    SetupError::InvalidDenyPattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                gate = gate.with_rule(Box::new(rule));
            }
            Arc::new(gate)
        }
        ConfirmationMode::Interactive => {
            let mut gate = InteractiveConfirmation::new(ConfirmationSession::shared(), surface);
            if let Some(viewer) = section
                .diff_command
                .as_deref()
                .and_then(CommandDiffViewer::parse)
            {
                gate = gate.with_viewer(Box::new(viewer));
            }
            Arc::new(gate)
        }
    };
    tracing::info!(%mode, "Confirmation policy selected");
    Ok(gate)
}

/// Native tools, the delegate and any discovered remote tools.
///
/// Remote tools whose names collide with an existing tool are skipped.
pub async fn build_registry(
    config: &AgentConfig,
    service: Arc<dyn CompletionService>,
    confirmation: Arc<dyn ConfirmationHandler>,
) -> Result<ToolRegistry, SetupError> {
    let mut read_only = ToolRegistry::new();
    register_read_only(&mut read_only)?;
    let sub_agent_settings = AgentSettings {
        max_iterations: config.agent.sub_agent_max_iterations,
        max_tool_output_bytes: config.agent.max_tool_output_bytes,
    };

    let shell = detect_shell(config.tools.shell.as_ref());
    tracing::debug!(%shell, binary = %shell.binary.display(), "Shell detected");

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, shell, confirmation)?;
    registry.register(Box::new(SubAgentTool::new(
        service,
        Arc::new(read_only),
        sub_agent_settings,
    )))?;

    if let Some(url) = config
        .mcp
        .server_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    {
        for tool in discover_tools(url, config.mcp_timeout()).await {
            let name = tool.name().to_string();
            if let Err(e) = registry.register(Box::new(tool)) {
                tracing::warn!(tool = %name, "Skipping remote tool: {e}");
            }
        }
    }

    tracing::info!(tools = ?registry.names(), "Tool registry ready");
    Ok(registry)
}

#[must_use]
pub fn build_agent(
    config: &AgentConfig,
    service: Arc<dyn CompletionService>,
    registry: ToolRegistry,
    project_dir: &Path,
) -> Agent {
    Agent::new(
        service,
        Arc::new(registry),
        NonEmptyString::from(SYSTEM_PROMPT),
        ToolCtx::new(project_dir, config.tool_timeout()),
        AgentSettings::from(&config.agent),
    )
}
