//! Core engine for Anvil: the tool-calling agent loop and its assembly.
//!
//! [`Agent`] drives one conversation against a [`CompletionService`] until the
//! model answers without tool calls or the iteration bound is hit. [`setup`]
//! builds the confirmation gate and tool registry from an [`AgentConfig`].

mod agent;
mod config;
mod delegate;
mod prompts;
pub mod setup;
mod tool_loop;

pub use agent::{Agent, AgentError, AgentSettings, LoopPhase};
pub use config::{
    AgentConfig, AgentSection, ConfigError, ConfirmationSection, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MODEL, McpSection, ModelConfig, ToolsSection, config_path, expand_env_vars,
};
pub use delegate::{DELEGATE, SubAgentTool};
pub use prompts::{SUB_AGENT_PROMPT, SYSTEM_PROMPT, initial_user_message};
pub use setup::{SetupError, build_agent, build_confirmation, build_registry};

pub use anvil_providers::{CompletionService, ProviderError};
pub use anvil_types::{EmptyStringError, Message, NonEmptyString};
