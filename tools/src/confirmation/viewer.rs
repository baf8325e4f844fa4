//! Escalation to an external diff/merge viewer.
//!
//! Availability is probed on every request; a missing viewer is reported as
//! [`ViewerVerdict::Unavailable`] and the caller falls back to its own menu.

use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::pin::Pin;

use tempfile::NamedTempFile;
use tokio::process::Command;

use super::FileWriteRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerVerdict {
    Unavailable,
    Approved,
    Rejected,
}

pub type ViewerFut<'a> = Pin<Box<dyn Future<Output = ViewerVerdict> + Send + 'a>>;

pub trait MergeViewer: Send + Sync {
    fn review<'a>(&'a self, request: &'a FileWriteRequest) -> ViewerFut<'a>;
}

/// Launches a configured diff command on temp copies of the before/after content.
///
/// `{old}` and `{new}` in the argument list are replaced with the temp file
/// paths; without placeholders both paths are appended. Exit status 0 approves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDiffViewer {
    program: String,
    args: Vec<String>,
}

impl CommandDiffViewer {
    /// Parse a whitespace-separated command line. Returns `None` when blank.
    #[must_use]
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn expand_args(&self, old: &Path, new: &Path) -> Vec<String> {
        let old = old.to_string_lossy();
        let new = new.to_string_lossy();
        let has_placeholder = self
            .args
            .iter()
            .any(|a| a.contains("{old}") || a.contains("{new}"));
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{old}", &old).replace("{new}", &new))
            .collect();
        if !has_placeholder {
            args.push(old.into_owned());
            args.push(new.into_owned());
        }
        args
    }

    async fn run(&self, request: &FileWriteRequest) -> io::Result<ViewerVerdict> {
        let program = match which::which(&self.program) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(program = %self.program, "Diff viewer not found: {e}");
                return Ok(ViewerVerdict::Unavailable);
            }
        };

        let suffix = request
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let old = snapshot(request.before.as_deref(), &suffix)?;
        let new = snapshot(request.after.as_deref(), &suffix)?;

        let status = Command::new(program)
            .args(self.expand_args(old.path(), new.path()))
            .status()
            .await?;
        tracing::info!(
            program = %self.program,
            path = %request.path.display(),
            success = status.success(),
            "External diff viewer closed"
        );
        Ok(if status.success() {
            ViewerVerdict::Approved
        } else {
            ViewerVerdict::Rejected
        })
    }
}

fn snapshot(content: Option<&str>, suffix: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("anvil-diff-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content.unwrap_or_default().as_bytes())?;
    file.flush()?;
    Ok(file)
}

impl MergeViewer for CommandDiffViewer {
    fn review<'a>(&'a self, request: &'a FileWriteRequest) -> ViewerFut<'a> {
        Box::pin(async move {
            match self.run(request).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::warn!(program = %self.program, "Diff viewer failed: {e}");
                    ViewerVerdict::Unavailable
                }
            }
        })
    }
}
