//! Environment — thin façade over process spawn, file I/O, and directory
//! scanning; owns the safety allow/deny policy (§4.4).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::AgentError;

static DENY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"rm\s+-rf\s+(/|~)\s*(\s|;|$)",
        r"dd\s+.*of=/dev/(disk|hd|sd)\w*",
        r"mkfs(\.\w+)?\s",
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        r"sudo\s+rm\s",
        r"format\s+[a-zA-Z]:",
        r"del\s+/s\s",
        r"^\s*```[\s\S]*```\s*$",
        r"^\s*```\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("deny pattern is valid regex"))
    .collect()
});

/// Thin façade over process spawn, file I/O, and directory scanning; the
/// single place that knows the allow-root sandbox and the command deny
/// list.
#[derive(Debug, Clone)]
pub struct Environment {
    pub allow_root: PathBuf,
    pub shell_override: Option<String>,
}

impl Environment {
    pub fn new(allow_root: impl Into<PathBuf>) -> Self {
        Self {
            allow_root: allow_root.into(),
            shell_override: None,
        }
    }

    pub fn with_shell_override(mut self, shell: impl Into<String>) -> Self {
        self.shell_override = Some(shell.into());
        self
    }

    /// Rejects commands matching the fixed deny-regex list (§4.4). Runs
    /// before spawn so a denial never becomes a child process.
    pub fn check_command_allowed(&self, command: &str) -> Result<(), AgentError> {
        for pattern in DENY_PATTERNS.iter() {
            if pattern.is_match(command) {
                warn!(%command, pattern = %pattern.as_str(), "command denied by safety policy");
                return Err(AgentError::SafetyDenied(format!(
                    "command matches a denied pattern: {}",
                    command
                )));
            }
        }
        Ok(())
    }

    /// Resolved shell: explicit override > config default > OS default.
    pub fn resolve_shell(&self, config_default: Option<&str>) -> (String, Vec<String>) {
        if let Some(shell) = &self.shell_override {
            return (shell.clone(), vec!["-c".to_string()]);
        }
        if let Some(shell) = config_default {
            return (shell.to_string(), vec!["-c".to_string()]);
        }
        if cfg!(target_os = "macos") {
            ("/bin/zsh".to_string(), vec!["-c".to_string()])
        } else if cfg!(target_os = "windows") {
            ("cmd".to_string(), vec!["/c".to_string()])
        } else {
            ("/bin/bash".to_string(), vec!["-c".to_string()])
        }
    }

    /// Validates a path stays within the allow-root after normalization,
    /// refusing symlinks whose target escapes it.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, AgentError> {
        let normalized = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.allow_root.join(path)
        };

        let canonical = if normalized.exists() {
            normalized
                .canonicalize()
                .map_err(|e| AgentError::FileIoError(e.to_string()))?
        } else {
            match normalized.parent() {
                Some(parent) if parent.exists() => {
                    let canonical_parent = parent
                        .canonicalize()
                        .map_err(|e| AgentError::FileIoError(e.to_string()))?;
                    canonical_parent.join(normalized.file_name().unwrap_or_default())
                }
                _ => normalized.clone(),
            }
        };

        let allow_root_canonical = self.allow_root.canonicalize().unwrap_or_else(|_| self.allow_root.clone());

        if canonical.starts_with(&allow_root_canonical) {
            Ok(canonical)
        } else {
            Err(AgentError::SafetyDenied(format!(
                "path {} escapes allow-root {}",
                path.display(),
                self.allow_root.display()
            )))
        }
    }

    /// Probes tool availability via `which`/`where`, using the same shell
    /// selection as SHELL_COMMAND.
    pub async fn probe_tool(&self, tool: &str) -> bool {
        let probe_cmd = if cfg!(target_os = "windows") { "where" } else { "which" };
        debug!(%tool, "probing tool availability");
        tokio::process::Command::new(probe_cmd)
            .arg(tool)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_deny_rm_rf_root() {
        let env = Environment::new(".");
        assert!(env.check_command_allowed("rm -rf / ; echo done").is_err());
    }

    #[test]
    fn test_deny_fork_bomb() {
        let env = Environment::new(".");
        assert!(env.check_command_allowed(":(){ :|:& };:").is_err());
    }

    #[test]
    fn test_deny_bare_code_fence() {
        let env = Environment::new(".");
        assert!(env.check_command_allowed("```\nsome code\n```").is_err());
    }

    #[test]
    fn test_allows_benign_command() {
        let env = Environment::new(".");
        assert!(env.check_command_allowed("echo hello").is_ok());
        assert!(env.check_command_allowed("cargo test").is_ok());
    }

    #[test]
    fn test_validate_path_within_allow_root() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("f.txt"), "hi").unwrap();
        let env = Environment::new(temp.path());
        assert!(env.validate_path(Path::new("f.txt")).is_ok());
    }

    #[test]
    fn test_validate_path_outside_allow_root() {
        let temp = tempdir().unwrap();
        let env = Environment::new(temp.path());
        assert!(env.validate_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_resolve_shell_override_wins() {
        let env = Environment::new(".").with_shell_override("/bin/fish");
        let (shell, _) = env.resolve_shell(Some("/bin/bash"));
        assert_eq!(shell, "/bin/fish");
    }
}
