//! Anvil CLI - runs one agent task against a project directory.
//!
//! ```text
//! main() -> AgentConfig::load -> build_confirmation -> build_registry -> Agent::run
//! ```
//!
//! Logs go to a file so the confirmation prompt owns the terminal. The final
//! answer is the only thing written to stdout.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use anvil_engine::{
    AgentConfig, CompletionService, NonEmptyString, build_agent, build_confirmation,
    build_registry, config_path, initial_user_message,
};
use anvil_providers::ChatCompletionsClient;
use anvil_tools::ConfirmationMode;
use anvil_tools::confirmation::TerminalPrompt;

#[derive(Debug, Parser)]
#[command(name = "anvil", version, about = "Autonomous tool-calling agent")]
struct Cli {
    /// Approve every file write and command without asking.
    #[arg(long, conflicts_with = "safe")]
    brave: bool,

    /// Decide with configured rules instead of prompting.
    #[arg(long)]
    safe: bool,

    /// Project directory the agent works in.
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Config file (default: ~/.anvil/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tool server endpoint, overriding `[mcp] server_url`.
    #[arg(long)]
    mcp_server: Option<String>,

    /// Completion request bound, overriding `[agent] max_iterations`.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Task description.
    #[arg(required = true, num_args = 1..)]
    task: Vec<String>,
}

impl Cli {
    /// Flags win over the configured mode.
    fn confirmation_mode(&self, configured: ConfirmationMode) -> ConfirmationMode {
        if self.brave {
            ConfirmationMode::Brave
        } else if self.safe {
            ConfirmationMode::Safe
        } else {
            configured
        }
    }

    fn apply_overrides(&self, config: &mut AgentConfig) {
        if let Some(url) = &self.mcp_server {
            config.mcp.server_url = Some(url.clone());
        }
        if let Some(limit) = self.max_iterations {
            config.agent.max_iterations = limit;
        }
        config.confirmation.mode = self.confirmation_mode(config.confirmation.mode);
    }

    fn task(&self) -> Result<NonEmptyString> {
        NonEmptyString::new(self.task.join(" ")).context("task must not be empty")
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with prompts.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.anvil/logs/anvil.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("anvil.log"));
    }

    // Fallback: ./.anvil/logs/anvil.log
    candidates.push(PathBuf::from(".anvil").join("logs").join("anvil.log"));

    candidates
}

fn resolve_project(dir: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(dir)
        .with_context(|| format!("project directory {} is not accessible", dir.display()))?;
    if !resolved.is_dir() {
        bail!("{} is not a directory", resolved.display());
    }
    Ok(resolved)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let task = cli.task()?;
    let project_dir = resolve_project(&cli.project)?;

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    if config.api_key().is_none() {
        tracing::warn!("No API key configured; requests are sent without authorization");
    }

    let service: Arc<dyn CompletionService> = Arc::new(
        ChatCompletionsClient::new(config.completion_config())
            .context("failed to build completion client")?,
    );
    let confirmation = build_confirmation(
        config.confirmation.mode,
        &config.confirmation,
        Box::new(TerminalPrompt::new()),
    )?;
    let registry = build_registry(&config, Arc::clone(&service), confirmation).await?;

    tracing::info!(
        project = %project_dir.display(),
        model = %config.model.model,
        mode = %config.confirmation.mode,
        "Starting run"
    );
    let mut agent = build_agent(&config, service, registry, &project_dir);
    let result = agent.run(initial_user_message(&project_dir, &task)).await;
    tracing::info!(
        iterations = agent.iterations(),
        phase = %agent.phase(),
        "Run finished"
    );

    let answer = result?;
    println!("{answer}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use anvil_engine::AgentConfig;
    use anvil_tools::ConfirmationMode;
    use clap::Parser;

    use super::{Cli, resolve_project};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("anvil").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn task_words_are_joined() {
        let cli = parse(&["fix", "the", "build"]);
        assert_eq!(cli.task().unwrap().as_str(), "fix the build");
    }

    #[test]
    fn task_is_required() {
        assert!(Cli::try_parse_from(["anvil", "--brave"]).is_err());
    }

    #[test]
    fn brave_and_safe_conflict() {
        assert!(Cli::try_parse_from(["anvil", "--brave", "--safe", "task"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = AgentConfig::default();
        config.confirmation.mode = ConfirmationMode::Safe;
        let cli = parse(&[
            "--brave",
            "--mcp-server",
            "http://localhost:8080/mcp",
            "--max-iterations",
            "4",
            "go",
        ]);
        cli.apply_overrides(&mut config);
        assert_eq!(config.confirmation.mode, ConfirmationMode::Brave);
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(
            config.mcp.server_url.as_deref(),
            Some("http://localhost:8080/mcp")
        );
    }

    #[test]
    fn configured_mode_kept_without_flags() {
        let mut config = AgentConfig::default();
        config.confirmation.mode = ConfirmationMode::Safe;
        parse(&["go"]).apply_overrides(&mut config);
        assert_eq!(config.confirmation.mode, ConfirmationMode::Safe);
        assert_eq!(
            parse(&["go"]).confirmation_mode(ConfirmationMode::default()),
            ConfirmationMode::Interactive
        );
    }

    #[test]
    fn project_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(resolve_project(dir.path()).is_ok());
        assert!(resolve_project(&file).is_err());
        assert!(resolve_project(&dir.path().join("missing")).is_err());
    }
}
