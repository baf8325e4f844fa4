//! Where interactive confirmation talks to the user.

use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;

use crossterm::style::Stylize;
use crossterm::tty::IsTty;

/// Reads one line of user input; `Ok(None)` means the input is closed.
pub type PromptFut<'a> = Pin<Box<dyn Future<Output = io::Result<Option<String>>> + Send + 'a>>;

pub trait PromptSurface: Send + Sync {
    /// Whether a user can answer prompts. When false the gate approves without asking.
    fn is_interactive(&self) -> bool;
    fn show(&self, text: &str);
    fn read_choice<'a>(&'a self, prompt: &'a str) -> PromptFut<'a>;
}

/// Prompt on the process's stdin/stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompt {
    color: bool,
}

impl TerminalPrompt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_tty(),
        }
    }

    fn write_line(&self, out: &mut impl Write, line: &str) -> io::Result<()> {
        if !self.color {
            return writeln!(out, "{line}");
        }
        if line.starts_with("@@") {
            writeln!(out, "{}", line.cyan())
        } else if line.starts_with('+') {
            writeln!(out, "{}", line.green())
        } else if line.starts_with('-') {
            writeln!(out, "{}", line.red())
        } else {
            writeln!(out, "{line}")
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptSurface for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        io::stdin().is_tty() && io::stdout().is_tty()
    }

    fn show(&self, text: &str) {
        let mut out = io::stdout().lock();
        for line in text.lines() {
            if let Err(e) = self.write_line(&mut out, line) {
                tracing::warn!("Failed to write confirmation prompt: {e}");
                return;
            }
        }
        let _ = out.flush();
    }

    fn read_choice<'a>(&'a self, prompt: &'a str) -> PromptFut<'a> {
        Box::pin(async move {
            {
                let mut out = io::stdout().lock();
                if self.color {
                    write!(out, "{} ", prompt.bold())?;
                } else {
                    write!(out, "{prompt} ")?;
                }
                out.flush()?;
            }
            tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
                let mut line = String::new();
                let read = io::stdin().read_line(&mut line)?;
                Ok((read > 0).then_some(line))
            })
            .await
            .map_err(io::Error::other)?
        })
    }
}
