//! `~/.anvil/config.toml` loading.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anvil_providers::ChatCompletionsConfig;
use anvil_tools::{ConfirmationMode, ShellConfig};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_MAX_TOOL_OUTPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_SUB_AGENT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MCP_TIMEOUT_SECS: u64 = 10;

const API_KEY_ENV_VARS: [&str; 2] = ["ANVIL_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

// Manual Debug impl to keep the API key out of logs.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: u32,
    pub max_tool_output_bytes: usize,
    pub sub_agent_max_iterations: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_output_bytes: DEFAULT_MAX_TOOL_OUTPUT_BYTES,
            sub_agent_max_iterations: DEFAULT_SUB_AGENT_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub default_timeout_secs: u64,
    /// Overrides shell detection for `run_command`.
    pub shell: Option<ShellConfig>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            shell: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub server_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            server_url: None,
            timeout_secs: DEFAULT_MCP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmationSection {
    pub mode: ConfirmationMode,
    /// External diff command offered by the interactive gate, e.g. `meld {old} {new}`.
    pub diff_command: Option<String>,
    /// Regular expressions; in safe mode, matching shell commands are rejected.
    pub deny_command_patterns: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: ModelConfig,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub mcp: McpSection,
    pub confirmation: ConfirmationSection,
}

/// Replace `${VAR}` with the variable's value (empty when unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = expand_env_vars(v);
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".anvil").join("config.toml"))
}

impl AgentConfig {
    /// Load from `explicit`, or from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match Self::parse(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Parse TOML text and expand `${VAR}` references.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env();
        Ok(config)
    }

    fn expand_env(&mut self) {
        self.model.base_url = expand_env_vars(&self.model.base_url);
        self.model.model = expand_env_vars(&self.model.model);
        expand_opt(&mut self.model.api_key);
        expand_opt(&mut self.mcp.server_url);
        expand_opt(&mut self.confirmation.diff_command);
    }

    /// Configured key, else `ANVIL_API_KEY`, else `OPENAI_API_KEY`.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        self.model
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|name| env::var(name).ok())
                    .find(|key| !key.trim().is_empty())
            })
    }

    #[must_use]
    pub fn completion_config(&self) -> ChatCompletionsConfig {
        let mut config = ChatCompletionsConfig::new(self.model.model.clone());
        config.base_url.clone_from(&self.model.base_url);
        config.api_key = self.api_key();
        config.timeout = Duration::from_secs(self.model.timeout_secs.max(1));
        config
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.default_timeout_secs.max(1))
    }

    #[must_use]
    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp.timeout_secs.max(1))
    }
}
