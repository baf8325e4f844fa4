//! Argument predicates run by native tools before any side effect.

use std::path::{Component, Path};

use crate::ToolError;

/// Upper bound on content written by a single tool call.
pub const MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on a command timeout, in seconds.
pub const MAX_TIMEOUT_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Validation {
    Valid,
    Invalid { reason: String },
}

impl Validation {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Convert into the error native tools return for bad arguments.
    pub fn into_result(self) -> Result<(), ToolError> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid { reason } => Err(ToolError::BadArgs { message: reason }),
        }
    }
}

pub fn validate_path(path: &str) -> Validation {
    if path.trim().is_empty() {
        return Validation::invalid("path must not be empty");
    }
    if path.contains('\0') {
        return Validation::invalid("path must not contain NUL bytes");
    }
    let components: Vec<Component<'_>> = Path::new(path).components().collect();
    if components
        .iter()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
    {
        return Validation::invalid(format!(
            "path must be relative to the project directory: {path}"
        ));
    }
    if components.iter().any(|c| matches!(c, Component::ParentDir)) {
        return Validation::invalid(format!("path must not contain '..' segments: {path}"));
    }
    Validation::Valid
}

pub fn validate_content(content: &str) -> Validation {
    if content.is_empty() {
        return Validation::invalid("content must not be empty");
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Validation::invalid(format!(
            "content is {} bytes; maximum is {MAX_CONTENT_BYTES}",
            content.len()
        ));
    }
    Validation::Valid
}

pub fn validate_command(command: &str) -> Validation {
    if command.trim().is_empty() {
        return Validation::invalid("command must not be empty");
    }
    Validation::Valid
}

pub fn validate_timeout(secs: i64) -> Validation {
    if secs <= 0 {
        return Validation::invalid(format!("timeout_secs must be positive, got {secs}"));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Validation::invalid(format!(
            "timeout_secs must be at most {MAX_TIMEOUT_SECS}, got {secs}"
        ));
    }
    Validation::Valid
}
