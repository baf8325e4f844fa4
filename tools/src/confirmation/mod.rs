//! Confirmation gate for side-effecting operations.
//!
//! Three interchangeable policies implement [`ConfirmationHandler`]:
//!
//! | Policy | Behavior |
//! |--------|----------|
//! | [`BraveConfirmation`] | Approves everything, no I/O |
//! | [`SafeConfirmation`] | Evaluates pluggable [`ConfirmationRule`]s; approves when none object |
//! | [`InteractiveConfirmation`] | Asks the user through a [`PromptSurface`] with sticky session state |
//!
//! Every request yields exactly one [`ConfirmationOutcome`], which the calling
//! tool turns into its own result. Outcomes are never raised as errors here.

mod interactive;
mod prompt;
mod viewer;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

pub use anvil_types::ConfirmationOutcome;
use regex::Regex;
use serde::Deserialize;

pub use interactive::{
    ConfirmationSession, InteractiveConfirmation, MAX_CONSECUTIVE_INVALID, MenuChoice,
    PREVIEW_DIFF_LINES, SharedSession,
};
pub use prompt::{PromptFut, PromptSurface, TerminalPrompt};
pub use viewer::{CommandDiffViewer, MergeViewer, ViewerFut, ViewerVerdict};

/// Future returned by confirmation entry points.
pub type ConfirmFut<'a> = Pin<Box<dyn Future<Output = ConfirmationOutcome> + Send + 'a>>;

/// A pending file write, with optional before/after content for previews.
///
/// `before: None` is a creation; `after: None` is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteRequest {
    pub path: PathBuf,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Operation descriptor handed to rules.
#[derive(Debug, Clone, Copy)]
pub enum OperationRequest<'a> {
    FileWrite(&'a FileWriteRequest),
    ShellCommand(&'a str),
}

impl OperationRequest<'_> {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OperationRequest::FileWrite(_) => "file write",
            OperationRequest::ShellCommand(_) => "shell command",
        }
    }
}

/// Decision function consulted by tools before a side effect.
pub trait ConfirmationHandler: Send + Sync {
    fn confirm_file_write<'a>(&'a self, request: &'a FileWriteRequest) -> ConfirmFut<'a>;
    fn confirm_shell_command<'a>(&'a self, command: &'a str) -> ConfirmFut<'a>;
}

/// Which policy the agent runs under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    Brave,
    Safe,
    #[default]
    Interactive,
}

impl fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfirmationMode::Brave => "brave",
            ConfirmationMode::Safe => "safe",
            ConfirmationMode::Interactive => "interactive",
        })
    }
}

impl FromStr for ConfirmationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brave" => Ok(Self::Brave),
            "safe" => Ok(Self::Safe),
            "interactive" => Ok(Self::Interactive),
            other => Err(format!(
                "unknown confirmation mode '{other}' (expected brave, safe, or interactive)"
            )),
        }
    }
}

/// Approves every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct BraveConfirmation;

impl ConfirmationHandler for BraveConfirmation {
    fn confirm_file_write<'a>(&'a self, _request: &'a FileWriteRequest) -> ConfirmFut<'a> {
        Box::pin(async { ConfirmationOutcome::Approved })
    }

    fn confirm_shell_command<'a>(&'a self, _command: &'a str) -> ConfirmFut<'a> {
        Box::pin(async { ConfirmationOutcome::Approved })
    }
}

/// One check evaluated by [`SafeConfirmation`].
///
/// `None` abstains; the first `Some` outcome decides the request.
pub trait ConfirmationRule: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, request: OperationRequest<'_>) -> Option<ConfirmationOutcome>;
}

/// Rejects shell commands matching a regular expression.
#[derive(Debug, Clone)]
pub struct DenyCommandPattern {
    pattern: Regex,
}

impl DenyCommandPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl ConfirmationRule for DenyCommandPattern {
    fn name(&self) -> &str {
        self.pattern.as_str()
    }

    fn evaluate(&self, request: OperationRequest<'_>) -> Option<ConfirmationOutcome> {
        match request {
            OperationRequest::ShellCommand(command) if self.pattern.is_match(command) => {
                Some(ConfirmationOutcome::Rejected)
            }
            _ => None,
        }
    }
}

/// Rule-driven policy. With no rules configured it approves everything.
#[derive(Default)]
pub struct SafeConfirmation {
    rules: Vec<Box<dyn ConfirmationRule>>,
}

impl SafeConfirmation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rule(mut self, rule: Box<dyn ConfirmationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn decide(&self, request: OperationRequest<'_>) -> ConfirmationOutcome {
        for rule in &self.rules {
            if let Some(outcome) = rule.evaluate(request) {
                tracing::info!(
                    rule = rule.name(),
                    kind = request.kind(),
                    outcome = ?outcome,
                    "Confirmation rule decided request"
                );
                return outcome;
            }
        }
        ConfirmationOutcome::Approved
    }
}

impl fmt::Debug for SafeConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("SafeConfirmation")
            .field("rules", &names)
            .finish()
    }
}

impl ConfirmationHandler for SafeConfirmation {
    fn confirm_file_write<'a>(&'a self, request: &'a FileWriteRequest) -> ConfirmFut<'a> {
        let outcome = self.decide(OperationRequest::FileWrite(request));
        Box::pin(async move { outcome })
    }

    fn confirm_shell_command<'a>(&'a self, command: &'a str) -> ConfirmFut<'a> {
        let outcome = self.decide(OperationRequest::ShellCommand(command));
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        BraveConfirmation, ConfirmationHandler, ConfirmationMode, ConfirmationOutcome,
        ConfirmationRule, DenyCommandPattern, FileWriteRequest, OperationRequest,
        SafeConfirmation,
    };

    fn write_request() -> FileWriteRequest {
        FileWriteRequest {
            path: PathBuf::from("notes.txt"),
            before: None,
            after: Some("hello\n".into()),
        }
    }

    struct Fixed(ConfirmationOutcome);

    impl ConfirmationRule for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn evaluate(&self, _request: OperationRequest<'_>) -> Option<ConfirmationOutcome> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn brave_approves_everything() {
        let gate = BraveConfirmation;
        assert_eq!(
            gate.confirm_file_write(&write_request()).await,
            ConfirmationOutcome::Approved
        );
        assert_eq!(
            gate.confirm_shell_command("rm -rf build").await,
            ConfirmationOutcome::Approved
        );
    }

    #[tokio::test]
    async fn safe_without_rules_approves() {
        let gate = SafeConfirmation::new();
        assert_eq!(gate.rule_count(), 0);
        assert_eq!(
            gate.confirm_file_write(&write_request()).await,
            ConfirmationOutcome::Approved
        );
        assert_eq!(
            gate.confirm_shell_command("cargo test").await,
            ConfirmationOutcome::Approved
        );
    }

    #[tokio::test]
    async fn safe_first_deciding_rule_wins() {
        let gate = SafeConfirmation::new()
            .with_rule(Box::new(DenyCommandPattern::new(r"^git\s+push").unwrap()))
            .with_rule(Box::new(Fixed(ConfirmationOutcome::Error("second".into()))));

        assert_eq!(
            gate.confirm_shell_command("git push origin main").await,
            ConfirmationOutcome::Rejected
        );
        // The pattern rule abstains, so the second rule decides.
        assert_eq!(
            gate.confirm_shell_command("git status").await,
            ConfirmationOutcome::Error("second".into())
        );
    }

    #[tokio::test]
    async fn deny_pattern_ignores_file_writes() {
        let gate =
            SafeConfirmation::new().with_rule(Box::new(DenyCommandPattern::new(".*").unwrap()));
        assert_eq!(
            gate.confirm_file_write(&write_request()).await,
            ConfirmationOutcome::Approved
        );
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Brave".parse::<ConfirmationMode>(), Ok(ConfirmationMode::Brave));
        assert_eq!(" safe ".parse::<ConfirmationMode>(), Ok(ConfirmationMode::Safe));
        assert!("reckless".parse::<ConfirmationMode>().is_err());
        assert_eq!(ConfirmationMode::default(), ConfirmationMode::Interactive);
    }
}
