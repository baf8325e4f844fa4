//! Dispatch of a single tool call into exactly one tool result.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use anvil_tools::{ToolCtx, ToolError, ToolRegistry, truncate_output, validate_args};
use anvil_types::{ToolCall, ToolResult};
use futures_util::FutureExt;
use serde_json::{Map, Value};

/// Run `call` against `registry`. Never fails: lookup, argument, execution and
/// panic failures all come back as error results.
pub(crate) async fn dispatch_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    ctx: &mut ToolCtx,
    max_output_bytes: usize,
) -> ToolResult {
    let Ok(executor) = registry.lookup(&call.name) else {
        tracing::warn!(tool = %call.name, call_id = %call.id, "Model requested unknown tool");
        return not_found_result(registry, call);
    };

    let args = match normalize_args(&call.arguments) {
        Ok(args) => args,
        Err(reason) => return invalid_args_result(call, &reason),
    };
    if let Err(err) = validate_args(&executor.schema(), &args) {
        let reason = match err {
            ToolError::BadArgs { message } => message,
            other => other.to_string(),
        };
        return invalid_args_result(call, &reason);
    }

    tracing::debug!(
        tool = %call.name,
        call_id = %call.id,
        side_effecting = executor.is_side_effecting(&args),
        "Executing tool"
    );

    // The call happens inside the guarded future so a panic while building
    // the tool's future is caught too.
    let guarded = AssertUnwindSafe(async { executor.execute(args, ctx).await }).catch_unwind();
    match guarded.await {
        Ok(Ok(output)) => ToolResult::success(
            call.id.clone(),
            call.name.clone(),
            truncate_output(output, max_output_bytes),
        ),
        Ok(Err(err)) => {
            tracing::debug!(tool = %call.name, "Tool failed: {err}");
            tool_error_result(call, err)
        }
        Err(payload) => {
            let panic_msg = panic_payload_to_string(payload.as_ref());
            tracing::warn!(tool = %call.name, "Tool panicked: {panic_msg}");
            ToolResult::error(
                call.id.clone(),
                call.name.clone(),
                format!("Tool panicked: {panic_msg}"),
            )
        }
    }
}

/// `null` becomes `{}`; anything but an object is rejected.
fn normalize_args(arguments: &Value) -> Result<Value, String> {
    match arguments {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(arguments.clone()),
        Value::String(_) => Err("arguments are not valid JSON".to_string()),
        Value::Bool(_) => Err("expected a JSON object, got a boolean".to_string()),
        Value::Number(_) => Err("expected a JSON object, got a number".to_string()),
        Value::Array(_) => Err("expected a JSON object, got an array".to_string()),
    }
}

fn not_found_result(registry: &ToolRegistry, call: &ToolCall) -> ToolResult {
    ToolResult::error(
        call.id.clone(),
        call.name.clone(),
        format!(
            "Tool not found: {}. Available tools: {}",
            call.name,
            registry.names().join(", ")
        ),
    )
}

fn invalid_args_result(call: &ToolCall, reason: &str) -> ToolResult {
    ToolResult::error(
        call.id.clone(),
        call.name.clone(),
        format!("Invalid arguments for {}: {reason}", call.name),
    )
}

pub(crate) fn tool_error_result(call: &ToolCall, err: ToolError) -> ToolResult {
    let message = match err {
        ToolError::BadArgs { message } => {
            format!("Invalid arguments for {}: {message}", call.name)
        }
        ToolError::Timeout { tool, elapsed } => {
            format!("Tool '{tool}' timed out after {}s", elapsed.as_secs())
        }
        ToolError::ExecutionFailed { tool, message } => format!("{tool} failed: {message}"),
        ToolError::UnknownTool { name } => format!("Tool not found: {name}"),
        ToolError::DuplicateTool { name } => format!("Duplicate tool: {name}"),
        ToolError::Rejected { operation, .. } => {
            format!("Rejected by user: {operation} was not performed")
        }
        ToolError::ConfirmationFailed { tool, message } => {
            format!("Confirmation for {tool} failed: {message}")
        }
    };

    ToolResult::error(call.id.clone(), call.name.clone(), message)
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
