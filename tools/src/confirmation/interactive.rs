//! Interactive confirmation state machine.
//!
//! Sticky session state (always-approve, always-deny, and the consecutive
//! invalid-input counter) lives in a [`ConfirmationSession`] owned by the
//! caller and handed in at construction, so independent agents can run with
//! independent gates.

use std::fmt::Write as _;
use std::sync::Arc;

use anvil_types::ConfirmationOutcome;
use anvil_utils::diff::{
    DEFAULT_CONTEXT_LINES, abbreviated_diff, compute_stats, diff_texts, format_unified_diff,
};
use tokio::sync::Mutex;

use super::prompt::PromptSurface;
use super::viewer::{MergeViewer, ViewerVerdict};
use super::{ConfirmFut, ConfirmationHandler, FileWriteRequest, OperationRequest};

/// Consecutive invalid answers tolerated before the request is rejected.
pub const MAX_CONSECUTIVE_INVALID: u32 = 3;

/// Diff lines shown inline before the menu.
pub const PREVIEW_DIFF_LINES: usize = 40;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfirmationSession {
    always_approve: bool,
    always_deny: bool,
    consecutive_invalid: u32,
}

pub type SharedSession = Arc<Mutex<ConfirmationSession>>;

impl ConfirmationSession {
    #[must_use]
    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::default()))
    }

    #[must_use]
    pub fn always_approve(&self) -> bool {
        self.always_approve
    }

    #[must_use]
    pub fn always_deny(&self) -> bool {
        self.always_deny
    }

    #[must_use]
    pub fn consecutive_invalid(&self) -> u32 {
        self.consecutive_invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Yes,
    No,
    Always,
    DenyAll,
    ViewFullDiff,
    External,
    Help,
}

const FILE_WRITE_MENU: &[MenuChoice] = &[
    MenuChoice::Yes,
    MenuChoice::No,
    MenuChoice::Always,
    MenuChoice::DenyAll,
    MenuChoice::ViewFullDiff,
    MenuChoice::External,
    MenuChoice::Help,
];

const SHELL_MENU: &[MenuChoice] = &[
    MenuChoice::Yes,
    MenuChoice::No,
    MenuChoice::Always,
    MenuChoice::DenyAll,
    MenuChoice::Help,
];

impl MenuChoice {
    /// Parse a trimmed, case-insensitive answer.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Self::Yes),
            "n" | "no" => Some(Self::No),
            "a" | "always" => Some(Self::Always),
            "d" | "deny" => Some(Self::DenyAll),
            "v" | "view" => Some(Self::ViewFullDiff),
            "e" | "external" => Some(Self::External),
            "h" | "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Yes => "y",
            Self::No => "n",
            Self::Always => "a",
            Self::DenyAll => "d",
            Self::ViewFullDiff => "v",
            Self::External => "e",
            Self::Help => "h",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::Yes => "approve this operation",
            Self::No => "reject this operation",
            Self::Always => "approve this and every later operation",
            Self::DenyAll => "reject this and every later operation",
            Self::ViewFullDiff => "show the complete diff",
            Self::External => "review in the external diff viewer",
            Self::Help => "show this help",
        }
    }
}

fn menu_for(request: OperationRequest<'_>) -> &'static [MenuChoice] {
    match request {
        OperationRequest::FileWrite(_) => FILE_WRITE_MENU,
        OperationRequest::ShellCommand(_) => SHELL_MENU,
    }
}

fn menu_prompt(menu: &[MenuChoice]) -> String {
    let keys: Vec<&str> = menu.iter().map(|c| c.key()).collect();
    format!("Proceed? [{}]", keys.join("/"))
}

fn help_text(menu: &[MenuChoice]) -> String {
    menu.iter().fold(String::new(), |mut out, choice| {
        let _ = writeln!(out, "  {}  {}", choice.key(), choice.help());
        out
    })
}

fn describe(request: OperationRequest<'_>) -> String {
    match request {
        OperationRequest::ShellCommand(command) => format!("Run shell command:\n  {command}"),
        OperationRequest::FileWrite(write) => {
            let path = write.path.display();
            let stats = compute_stats(write.before.as_deref(), write.after.as_deref());
            match (&write.before, &write.after) {
                (Some(before), Some(after)) => format!(
                    "Modify file: {path} ({stats})\n{}",
                    abbreviated_diff(before, after, PREVIEW_DIFF_LINES)
                ),
                (None, Some(_)) => format!("Create file: {path} ({stats})"),
                (Some(_), None) => format!("Delete file: {path} ({stats})"),
                (None, None) => format!("Write file: {path}"),
            }
        }
    }
}

fn full_diff(request: &FileWriteRequest) -> String {
    let before = request.before.as_deref().unwrap_or_default();
    let after = request.after.as_deref().unwrap_or_default();
    format_unified_diff(&diff_texts(before, after), DEFAULT_CONTEXT_LINES)
}

/// Asks the user before each side-effecting operation.
pub struct InteractiveConfirmation {
    session: SharedSession,
    surface: Box<dyn PromptSurface>,
    viewer: Option<Box<dyn MergeViewer>>,
}

impl InteractiveConfirmation {
    #[must_use]
    pub fn new(session: SharedSession, surface: Box<dyn PromptSurface>) -> Self {
        Self {
            session,
            surface,
            viewer: None,
        }
    }

    #[must_use]
    pub fn with_viewer(mut self, viewer: Box<dyn MergeViewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    #[must_use]
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    async fn decide(&self, request: OperationRequest<'_>) -> ConfirmationOutcome {
        let mut session = self.session.lock().await;
        if session.always_deny {
            return ConfirmationOutcome::Rejected;
        }
        if session.always_approve {
            return ConfirmationOutcome::Approved;
        }
        if !self.surface.is_interactive() {
            tracing::warn!(
                kind = request.kind(),
                "No interactive terminal; approving without confirmation"
            );
            return ConfirmationOutcome::Approved;
        }

        let menu = menu_for(request);
        let prompt = menu_prompt(menu);
        self.surface.show(&describe(request));

        loop {
            let input = match self.surface.read_choice(&prompt).await {
                Ok(Some(line)) => line,
                Ok(None) => return ConfirmationOutcome::Error("confirmation input closed".into()),
                Err(e) => {
                    return ConfirmationOutcome::Error(format!(
                        "failed to read confirmation input: {e}"
                    ));
                }
            };

            let Some(choice) = MenuChoice::parse(&input).filter(|c| menu.contains(c)) else {
                session.consecutive_invalid += 1;
                if session.consecutive_invalid >= MAX_CONSECUTIVE_INVALID {
                    session.consecutive_invalid = 0;
                    self.surface
                        .show("Too many invalid answers; rejecting the operation.");
                    return ConfirmationOutcome::Rejected;
                }
                self.surface.show(&format!(
                    "Invalid choice '{}'. Enter h for help.",
                    input.trim()
                ));
                continue;
            };
            session.consecutive_invalid = 0;

            match choice {
                MenuChoice::Yes => return ConfirmationOutcome::Approved,
                MenuChoice::No => return ConfirmationOutcome::Rejected,
                MenuChoice::Always => {
                    session.always_approve = true;
                    return ConfirmationOutcome::Approved;
                }
                MenuChoice::DenyAll => {
                    session.always_deny = true;
                    return ConfirmationOutcome::Rejected;
                }
                MenuChoice::Help => self.surface.show(&help_text(menu)),
                MenuChoice::ViewFullDiff => {
                    if let OperationRequest::FileWrite(write) = request {
                        self.surface.show(&full_diff(write));
                    }
                }
                MenuChoice::External => {
                    let verdict = match (&self.viewer, request) {
                        (Some(viewer), OperationRequest::FileWrite(write)) => {
                            viewer.review(write).await
                        }
                        _ => ViewerVerdict::Unavailable,
                    };
                    match verdict {
                        ViewerVerdict::Approved => return ConfirmationOutcome::Approved,
                        ViewerVerdict::Rejected => return ConfirmationOutcome::Rejected,
                        ViewerVerdict::Unavailable => self
                            .surface
                            .show("External diff viewer is not available."),
                    }
                }
            }
        }
    }
}

impl ConfirmationHandler for InteractiveConfirmation {
    fn confirm_file_write<'a>(&'a self, request: &'a FileWriteRequest) -> ConfirmFut<'a> {
        Box::pin(self.decide(OperationRequest::FileWrite(request)))
    }

    fn confirm_shell_command<'a>(&'a self, command: &'a str) -> ConfirmFut<'a> {
        Box::pin(self.decide(OperationRequest::ShellCommand(command)))
    }
}
