//! agentcore configuration types and loading (§6 Configuration).

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration, matching the `agent.*`/`ai.*`/`tools.*` keys
/// recognized by the Agent Service (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSection,
    pub ai: LlmConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, project-local
    /// `.agentcore.yml`, user config, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".agentcore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentcore").join("agentcore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// `agent.mode` (§6): governs prompts on failure and approval gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentMode {
    #[default]
    Interactive,
    Autonomous,
    Supervised,
    Manual,
}

/// `agent.shutdown.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_seconds: 5 }
    }
}

/// The `agent.*` configuration section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub enabled: bool,
    pub mode: AgentMode,
    #[serde(rename = "max-concurrent-tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(rename = "execution-interval-ms")]
    pub execution_interval_ms: u64,
    pub shutdown: ShutdownConfig,
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,
    #[serde(rename = "backup-retention-days")]
    pub backup_retention_days: u32,
    #[serde(rename = "history-size")]
    pub history_size: usize,
    #[serde(rename = "allow-roots")]
    pub allow_roots: Vec<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AgentMode::default(),
            max_concurrent_tasks: 3,
            execution_interval_ms: 5_000,
            shutdown: ShutdownConfig::default(),
            state_path: PathBuf::from("./agent-state.json"),
            backup_retention_days: 7,
            history_size: 500,
            allow_roots: vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))],
        }
    }
}

/// The `ai.*` configuration section — also the AI Adapter's own config
/// (§6); `defaultProvider`/`model`/`temperature`/`maxTokens` map onto the
/// fields an LLM client needs to construct itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
    #[serde(rename = "base-url")]
    pub base_url: String,
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
            temperature: 1.0,
        }
    }
}

/// One entry of `tools.servers` (§6): `serverId → {url, enabled, priority, headers}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// The `tools.*` configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub servers: std::collections::HashMap<String, ToolServerConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ai.provider, "anthropic");
        assert_eq!(config.agent.max_concurrent_tasks, 3);
        assert_eq!(config.agent.mode, AgentMode::Interactive);
    }

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert!(config.model.contains("sonnet"));
        assert_eq!(config.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
agent:
  mode: AUTONOMOUS
  max-concurrent-tasks: 8
ai:
  provider: anthropic
  model: claude-opus-4
  api-key-env: MY_API_KEY
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent.mode, AgentMode::Autonomous);
        assert_eq!(config.agent.max_concurrent_tasks, 8);
        assert_eq!(config.ai.model, "claude-opus-4");
        assert_eq!(config.ai.api_key_env, "MY_API_KEY");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = "ai:\n  model: claude-haiku\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ai.model, "claude-haiku");
        assert_eq!(config.agent.max_concurrent_tasks, 3);
    }

    #[test]
    fn test_tools_servers_parse() {
        let yaml = r#"
tools:
  servers:
    primary:
      url: "http://localhost:8080"
      priority: 1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let server = config.tools.servers.get("primary").unwrap();
        assert_eq!(server.url, "http://localhost:8080");
        assert!(server.enabled);
    }
}
