//! Tool executor framework: the capability contract, the registry, argument
//! validation, the confirmation gate, and the built-in tools.

pub mod builtins;
pub mod confirmation;
pub mod shell;
pub mod validation;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use anvil_types::ToolDefinition;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use builtins::{ListDirectoryTool, ReadFileTool, RunCommandTool, WriteFileTool};
pub use confirmation::{
    BraveConfirmation, ConfirmationHandler, ConfirmationMode, FileWriteRequest,
    InteractiveConfirmation, OperationRequest, SafeConfirmation,
};
pub use shell::{DetectedShell, ShellConfig, detect_shell};
pub use validation::Validation;

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

/// Error types for tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Tool timed out: {tool}")]
    Timeout { tool: String, elapsed: Duration },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error("{tool}: {operation} rejected by user")]
    Rejected { tool: String, operation: String },
    #[error("{tool}: confirmation failed: {message}")]
    ConfirmationFailed { tool: String, message: String },
}

impl ToolError {
    pub(crate) fn failed(tool: &str, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// A named capability the model can invoke.
///
/// Native tools, protocol-backed adapters, and the sub-agent delegate all
/// implement this trait, so the orchestrator dispatches them identically.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the argument object.
    fn schema(&self) -> Value;
    fn is_side_effecting(&self, args: &Value) -> bool;
    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a>;
}

/// Per-call tool context.
#[derive(Debug, Clone)]
pub struct ToolCtx {
    pub working_dir: PathBuf,
    pub default_timeout: Duration,
    pub tool_call_id: String,
}

impl ToolCtx {
    pub fn new(working_dir: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        Self {
            working_dir: working_dir.into(),
            default_timeout,
            tool_call_id: String::new(),
        }
    }

    #[must_use]
    pub fn for_call(&self, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            ..self.clone()
        }
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

/// Name-keyed set of executors. Built once at startup and read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name().to_string();
        if self.executors.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|exec| ToolDefinition::new(exec.name(), exec.description(), exec.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    if let Err(err) = validator.validate(args) {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}

/// Truncate tool output to the effective maximum length.
#[must_use]
pub fn truncate_output(output: String, effective_max: usize) -> String {
    if output.len() <= effective_max {
        return output;
    }
    let marker = "\n\n... [output truncated]";
    if effective_max <= marker.len() {
        return marker[..effective_max].to_string();
    }
    let mut end = effective_max - marker.len();
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = output;
    truncated.truncate(end);
    truncated.push_str(marker);
    truncated
}
