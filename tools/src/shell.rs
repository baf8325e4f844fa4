//! Shell selection for `run_command`.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Shell override from configuration.
///
/// ```toml
/// [tools.shell]
/// binary = "zsh"
/// args = ["-c"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
    pub binary: Option<String>,
    pub args: Option<Vec<String>>,
}

/// Shell used to run command strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedShell {
    pub binary: PathBuf,
    /// Arguments placed before the command string (e.g., `["-c"]`).
    pub args: Vec<String>,
    pub name: String,
}

impl fmt::Display for DetectedShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Pick a shell: configured override first, then the platform default.
#[must_use]
pub fn detect_shell(config: Option<&ShellConfig>) -> DetectedShell {
    if let Some(binary) = config.and_then(|c| c.binary.as_deref()) {
        let args = config
            .and_then(|c| c.args.clone())
            .unwrap_or_else(|| default_args_for(binary));
        return DetectedShell {
            binary: PathBuf::from(binary),
            args,
            name: "configured".into(),
        };
    }
    let shell = platform_shell();
    tracing::debug!(shell = %shell, binary = %shell.binary.display(), "Detected shell");
    shell
}

fn default_args_for(binary: &str) -> Vec<String> {
    let stem = Path::new(binary)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(binary)
        .to_ascii_lowercase();
    match stem.as_str() {
        "cmd" => vec!["/C".into()],
        "pwsh" | "powershell" => vec!["-NoProfile".into(), "-Command".into()],
        _ => vec!["-c".into()],
    }
}

#[cfg(windows)]
fn platform_shell() -> DetectedShell {
    for name in ["pwsh", "powershell"] {
        if let Ok(binary) = which::which(name) {
            return DetectedShell {
                binary,
                args: default_args_for(name),
                name: name.into(),
            };
        }
    }
    DetectedShell {
        binary: env::var_os("ComSpec")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows\System32\cmd.exe")),
        args: vec!["/C".into()],
        name: "cmd".into(),
    }
}

#[cfg(not(windows))]
fn platform_shell() -> DetectedShell {
    if let Some(shell) = env::var_os("SHELL").map(PathBuf::from)
        && shell.exists()
    {
        let name = shell
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("user-shell")
            .to_string();
        return DetectedShell {
            binary: shell,
            args: vec!["-c".into()],
            name,
        };
    }
    match which::which("bash") {
        Ok(binary) => DetectedShell {
            binary,
            args: vec!["-c".into()],
            name: "bash".into(),
        },
        Err(_) => DetectedShell {
            binary: PathBuf::from("/bin/sh"),
            args: vec!["-c".into()],
            name: "sh".into(),
        },
    }
}
