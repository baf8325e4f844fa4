//! Built-in tool executors.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anvil_types::ConfirmationOutcome;
use anvil_utils::diff::compute_stats;
use ignore::WalkBuilder;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::confirmation::{ConfirmationHandler, FileWriteRequest};
use crate::shell::DetectedShell;
use crate::validation::{validate_command, validate_content, validate_path, validate_timeout};
use crate::{ToolCtx, ToolError, ToolExecutor, ToolFut, ToolRegistry, parse_args};

pub const READ_FILE: &str = "read_file";
pub const LIST_DIRECTORY: &str = "list_directory";
pub const WRITE_FILE: &str = "write_file";
pub const RUN_COMMAND: &str = "run_command";

/// Register the tools that never modify anything.
pub fn register_read_only(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(Box::new(ReadFileTool))?;
    registry.register(Box::new(ListDirectoryTool))?;
    Ok(())
}

/// Register every built-in tool; side-effecting ones consult `confirmation`.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    shell: DetectedShell,
    confirmation: Arc<dyn ConfirmationHandler>,
) -> Result<(), ToolError> {
    register_read_only(registry)?;
    registry.register(Box::new(WriteFileTool::new(Arc::clone(&confirmation))))?;
    registry.register(Box::new(RunCommandTool::new(shell, confirmation)))?;
    Ok(())
}

fn resolve(ctx: &ToolCtx, path: &str) -> PathBuf {
    ctx.working_dir.join(path)
}

fn confirmation_error(tool: &str, operation: String, outcome: ConfirmationOutcome) -> Option<ToolError> {
    match outcome {
        ConfirmationOutcome::Approved => None,
        ConfirmationOutcome::Rejected => Some(ToolError::Rejected {
            tool: tool.to_string(),
            operation,
        }),
        ConfirmationOutcome::Error(message) => Some(ToolError::ConfirmationFailed {
            tool: tool.to_string(),
            message,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct ListDirectoryArgs {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RunCommandArgs {
    command: String,
    #[serde(default)]
    timeout_secs: Option<i64>,
}

/// Reads a UTF-8 text file relative to the working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFileTool;

impl ToolExecutor for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a text file"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, relative to the project directory." }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: PathArgs = parse_args(&args)?;
            validate_path(&typed.path).into_result()?;

            let resolved = resolve(ctx, &typed.path);
            tokio::fs::read_to_string(&resolved).await.map_err(|e| {
                ToolError::failed(READ_FILE, format!("failed to read {}: {e}", typed.path))
            })
        })
    }
}

/// Lists one directory level, honoring ignore files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListDirectoryTool;

fn list_entries(dir: &Path) -> Result<Vec<String>, ignore::Error> {
    let mut entries = Vec::new();
    for entry in WalkBuilder::new(dir).max_depth(Some(1)).build() {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();
    Ok(entries)
}

impl ToolExecutor for ListDirectoryTool {
    fn name(&self) -> &str {
        LIST_DIRECTORY
    }

    fn description(&self) -> &str {
        "List the entries of a directory (directories end with '/')"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list. Defaults to the project directory." }
            },
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: ListDirectoryArgs = parse_args(&args)?;
            let dir = match typed.path.as_deref() {
                Some(path) => {
                    validate_path(path).into_result()?;
                    resolve(ctx, path)
                }
                None => ctx.working_dir.clone(),
            };
            if !dir.is_dir() {
                return Err(ToolError::failed(
                    LIST_DIRECTORY,
                    format!("not a directory: {}", dir.display()),
                ));
            }

            let listing = tokio::task::spawn_blocking(move || list_entries(&dir))
                .await
                .map_err(|e| ToolError::failed(LIST_DIRECTORY, e.to_string()))?
                .map_err(|e| ToolError::failed(LIST_DIRECTORY, e.to_string()))?;

            if listing.is_empty() {
                return Ok("(empty directory)".to_string());
            }
            Ok(listing.join("\n"))
        })
    }
}

/// Creates or replaces a file after confirmation.
pub struct WriteFileTool {
    confirmation: Arc<dyn ConfirmationHandler>,
}

impl WriteFileTool {
    #[must_use]
    pub fn new(confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        Self { confirmation }
    }
}

impl ToolExecutor for WriteFileTool {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it and its parent directories if needed"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path, relative to the project directory." },
                "content": { "type": "string", "description": "Full file content to write." }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: WriteFileArgs = parse_args(&args)?;
            validate_path(&typed.path).into_result()?;
            validate_content(&typed.content).into_result()?;

            let resolved = resolve(ctx, &typed.path);
            let before = match tokio::fs::read_to_string(&resolved).await {
                Ok(text) => Some(text),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(ToolError::failed(
                        WRITE_FILE,
                        format!("failed to read existing {}: {e}", typed.path),
                    ));
                }
            };
            if before.as_deref() == Some(typed.content.as_str()) {
                return Ok(format!("No changes to {}", typed.path));
            }

            let stats = compute_stats(before.as_deref(), Some(&typed.content));
            let request = FileWriteRequest {
                path: resolved.clone(),
                before,
                after: Some(typed.content),
            };
            let outcome = self.confirmation.confirm_file_write(&request).await;
            if let Some(err) =
                confirmation_error(WRITE_FILE, format!("write to {}", typed.path), outcome)
            {
                return Err(err);
            }

            let created = request.before.is_none();
            let bytes = request.after.unwrap_or_default().into_bytes();
            let byte_len = bytes.len();
            tokio::task::spawn_blocking(move || anvil_utils::atomic_write(&resolved, &bytes))
                .await
                .map_err(|e| ToolError::failed(WRITE_FILE, e.to_string()))?
                .map_err(|e| {
                    ToolError::failed(WRITE_FILE, format!("failed to write {}: {e}", typed.path))
                })?;

            tracing::info!(path = %typed.path, bytes = byte_len, %stats, "File written");
            let verb = if created { "Created" } else { "Updated" };
            Ok(format!("{verb} {} ({byte_len} bytes, {stats})", typed.path))
        })
    }
}

/// Runs a command through the detected shell after confirmation.
pub struct RunCommandTool {
    shell: DetectedShell,
    confirmation: Arc<dyn ConfirmationHandler>,
}

impl RunCommandTool {
    #[must_use]
    pub fn new(shell: DetectedShell, confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        Self {
            shell,
            confirmation,
        }
    }
}

fn format_command_output(status: Option<i32>, stdout: &[u8], stderr: &[u8]) -> String {
    let mut out = String::new();
    match status {
        Some(code) => {
            let _ = writeln!(out, "exit code: {code}");
        }
        None => out.push_str("exit code: terminated by signal\n"),
    }
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    if !stdout.trim().is_empty() {
        let _ = write!(out, "stdout:\n{}\n", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        let _ = write!(out, "stderr:\n{}\n", stderr.trim_end());
    }
    out
}

impl ToolExecutor for RunCommandTool {
    fn name(&self) -> &str {
        RUN_COMMAND
    }

    fn description(&self) -> &str {
        "Run a shell command in the project directory and return its exit code and output"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute." },
                "timeout_secs": { "type": "integer", "description": "Kill the command after this many seconds (1-600)." }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: RunCommandArgs = parse_args(&args)?;
            validate_command(&typed.command).into_result()?;
            let timeout = match typed.timeout_secs {
                Some(secs) => {
                    validate_timeout(secs).into_result()?;
                    Duration::from_secs(secs.unsigned_abs())
                }
                None => ctx.default_timeout,
            };

            let outcome = self
                .confirmation
                .confirm_shell_command(&typed.command)
                .await;
            if let Some(err) = confirmation_error(
                RUN_COMMAND,
                format!("command `{}`", typed.command),
                outcome,
            ) {
                return Err(err);
            }

            let child = Command::new(&self.shell.binary)
                .args(&self.shell.args)
                .arg(&typed.command)
                .current_dir(&ctx.working_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ToolError::failed(RUN_COMMAND, format!("failed to spawn: {e}")))?;

            tracing::debug!(
                shell = %self.shell,
                command = %typed.command,
                timeout_secs = timeout.as_secs(),
                "Spawned command"
            );

            // Dropping the child on timeout kills it.
            let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => {
                    result.map_err(|e| ToolError::failed(RUN_COMMAND, e.to_string()))?
                }
                Err(_) => {
                    return Err(ToolError::Timeout {
                        tool: RUN_COMMAND.to_string(),
                        elapsed: timeout,
                    });
                }
            };

            Ok(format_command_output(
                output.status.code(),
                &output.stdout,
                &output.stderr,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;

    use super::{
        ListDirectoryTool, ReadFileTool, RunCommandTool, WriteFileTool, format_command_output,
        register_builtins,
    };
    use crate::confirmation::{
        BraveConfirmation, ConfirmFut, ConfirmationHandler, ConfirmationOutcome, FileWriteRequest,
    };
    use crate::shell::detect_shell;
    use crate::{ToolCtx, ToolError, ToolExecutor, ToolRegistry};

    /// Returns a fixed outcome and records what it was asked.
    struct Recording {
        outcome: ConfirmationOutcome,
        calls: AtomicUsize,
        last_write: Mutex<Option<FileWriteRequest>>,
    }

    impl Recording {
        fn new(outcome: ConfirmationOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                last_write: Mutex::new(None),
            })
        }
    }

    impl ConfirmationHandler for Recording {
        fn confirm_file_write<'a>(&'a self, request: &'a FileWriteRequest) -> ConfirmFut<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_write.lock().unwrap() = Some(request.clone());
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome })
        }

        fn confirm_shell_command<'a>(&'a self, _command: &'a str) -> ConfirmFut<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome })
        }
    }

    fn ctx(dir: &tempfile::TempDir) -> ToolCtx {
        ToolCtx::new(dir.path(), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn read_file_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        let out = ReadFileTool
            .execute(json!({"path": "a.txt"}), &mut ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out, "alpha\n");
    }

    #[tokio::test]
    async fn read_file_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFileTool
            .execute(json!({"path": "../secret"}), &mut ctx(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadArgs { .. }));
    }

    #[tokio::test]
    async fn read_file_missing_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFileTool
            .execute(json!({"path": "nope.txt"}), &mut ctx(&dir))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }

    #[tokio::test]
    async fn list_directory_sorts_and_marks_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        let out = ListDirectoryTool
            .execute(json!({}), &mut ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out, "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn list_directory_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = ListDirectoryTool
            .execute(json!({"path": "."}), &mut ctx(&dir))
            .await
            .unwrap();
        assert_eq!(out, "(empty directory)");
    }

    #[tokio::test]
    async fn write_file_creates_after_approval() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Recording::new(ConfirmationOutcome::Approved);
        let tool = WriteFileTool::new(gate.clone());

        let out = tool
            .execute(
                json!({"path": "new/notes.md", "content": "one\ntwo\n"}),
                &mut ctx(&dir),
            )
            .await
            .unwrap();

        assert!(out.starts_with("Created new/notes.md"), "{out}");
        assert!(out.contains("+2 -0 ~0"));
        assert_eq!(
            fs::read_to_string(dir.path().join("new/notes.md")).unwrap(),
            "one\ntwo\n"
        );
        let seen = gate.last_write.lock().unwrap().clone().unwrap();
        assert_eq!(seen.before, None);
        assert_eq!(seen.after.as_deref(), Some("one\ntwo\n"));
    }

    #[tokio::test]
    async fn write_file_passes_previous_content_to_gate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "a\nb\nc\n").unwrap();
        let gate = Recording::new(ConfirmationOutcome::Approved);
        let tool = WriteFileTool::new(gate.clone());

        let out = tool
            .execute(json!({"path": "f.txt", "content": "a\nx\nc\n"}), &mut ctx(&dir))
            .await
            .unwrap();

        assert!(out.contains("+0 -0 ~1"), "{out}");
        let seen = gate.last_write.lock().unwrap().clone().unwrap();
        assert_eq!(seen.before.as_deref(), Some("a\nb\nc\n"));
    }

    #[tokio::test]
    async fn write_file_rejection_leaves_disk_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(Recording::new(ConfirmationOutcome::Rejected));

        let err = tool
            .execute(json!({"path": "x.txt", "content": "data"}), &mut ctx(&dir))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("rejected by user"));
        assert!(!dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn write_file_confirmation_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new(Recording::new(ConfirmationOutcome::Error(
            "input closed".into(),
        )));

        let err = tool
            .execute(json!({"path": "x.txt", "content": "data"}), &mut ctx(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::ConfirmationFailed { .. }));
        assert!(err.to_string().contains("input closed"));
    }

    #[tokio::test]
    async fn write_file_validates_before_confirming() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Recording::new(ConfirmationOutcome::Approved);
        let tool = WriteFileTool::new(gate.clone());

        let err = tool
            .execute(json!({"path": "x.txt", "content": ""}), &mut ctx(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::BadArgs { .. }));
        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_file_refuses_paths_outside_project() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("escaped.txt");
        let gate = Recording::new(ConfirmationOutcome::Approved);
        let tool = WriteFileTool::new(gate.clone());

        let err = tool
            .execute(
                json!({"path": target.to_string_lossy(), "content": "x"}),
                &mut ctx(&dir),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::BadArgs { .. }));
        assert!(!target.exists());
        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_file_identical_content_skips_gate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("same.txt"), "keep").unwrap();
        let gate = Recording::new(ConfirmationOutcome::Rejected);
        let tool = WriteFileTool::new(gate.clone());

        let out = tool
            .execute(json!({"path": "same.txt", "content": "keep"}), &mut ctx(&dir))
            .await
            .unwrap();

        assert_eq!(out, "No changes to same.txt");
        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_command_reports_exit_code_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunCommandTool::new(detect_shell(None), Arc::new(BraveConfirmation));

        let out = tool
            .execute(json!({"command": "echo hello; exit 3"}), &mut ctx(&dir))
            .await
            .unwrap();

        assert!(out.starts_with("exit code: 3"), "{out}");
        assert!(out.contains("stdout:\nhello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunCommandTool::new(detect_shell(None), Arc::new(BraveConfirmation));

        let err = tool
            .execute(
                json!({"command": "sleep 5", "timeout_secs": 1}),
                &mut ctx(&dir),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn run_command_rejects_bad_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Recording::new(ConfirmationOutcome::Approved);
        let tool = RunCommandTool::new(detect_shell(None), gate.clone());

        let err = tool
            .execute(
                json!({"command": "echo hi", "timeout_secs": 0}),
                &mut ctx(&dir),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timeout_secs"));
        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_command_rejected_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunCommandTool::new(
            detect_shell(None),
            Recording::new(ConfirmationOutcome::Rejected),
        );

        let err = tool
            .execute(json!({"command": "touch marker"}), &mut ctx(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Rejected { .. }));
        assert!(!dir.path().join("marker").exists());
    }

    #[test]
    fn command_output_omits_empty_streams() {
        let out = format_command_output(Some(0), b"", b"warning\n");
        assert_eq!(out, "exit code: 0\nstderr:\nwarning\n");
    }

    #[test]
    fn register_builtins_installs_four_tools() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry, detect_shell(None), Arc::new(BraveConfirmation))
            .unwrap();
        assert_eq!(
            registry.names(),
            vec!["list_directory", "read_file", "run_command", "write_file"]
        );
    }
}
