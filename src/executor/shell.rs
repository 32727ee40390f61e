//! SHELL_COMMAND / SCRIPT_EXECUTION handlers (§4.3).

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use crate::environment::Environment;
use crate::error::AgentError;

const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub async fn execute(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let command = params
        .get("command")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation("missing required parameter `command`".into()))?;

    environment.check_command_allowed(command)?;

    let working_directory = params.get("workingDirectory").and_then(Value::as_str);
    let explicit_shell = params.get("shell").and_then(Value::as_str);
    let (shell_bin, shell_args) = match explicit_shell {
        Some(s) => (s.to_string(), vec!["-c".to_string()]),
        None => environment.resolve_shell(None),
    };
    let timeout_ms = params.get("timeoutMs").and_then(Value::as_u64).unwrap_or(30_000);

    let mut cmd = tokio::process::Command::new(&shell_bin);
    cmd.args(&shell_args)
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_directory {
        cmd.current_dir(dir);
    }
    if let Some(env_map) = params.get("environment").and_then(Value::as_object) {
        for (k, v) in env_map {
            if let Some(s) = v.as_str() {
                cmd.env(k, s);
            }
        }
    }

    let start = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| AgentError::ProcessError(format!("failed to spawn `{shell_bin}`: {e}")))?;

    let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(AgentError::ProcessError(e.to_string())),
        Err(_) => {
            warn!(%command, timeout_ms, "shell command timed out; child killed by kill-on-drop");
            return Err(AgentError::Timeout { timeout_ms });
        }
    };

    let exit_code = output.status.code();
    let (stdout, stdout_truncated) = truncate_utf8(&output.stdout, MAX_OUTPUT_BYTES);
    let (stderr, stderr_truncated) = truncate_utf8(&output.stderr, MAX_OUTPUT_BYTES);

    let combined = if stderr.is_empty() {
        stdout.clone()
    } else if stdout.is_empty() {
        stderr.clone()
    } else {
        format!("{stdout}\n\nSTDERR:\n{stderr}")
    };

    let execution_time_ms = start.elapsed().as_millis() as u64;

    if !output.status.success() {
        return Err(AgentError::ProcessError(format!(
            "exit code {}: {}",
            exit_code.unwrap_or(-1),
            combined
        )));
    }

    Ok(serde_json::json!({
        "output": combined,
        "exitCode": exit_code,
        "commandsExecuted": [command],
        "executionTimeMs": execution_time_ms,
        "outputTruncated": stdout_truncated || stderr_truncated,
    }))
}

pub async fn execute_script(environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let content = params
        .get("scriptContent")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation("missing required parameter `scriptContent`".into()))?;
    let language = params
        .get("language")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation("missing required parameter `language`".into()))?;

    let (interpreter, extension) = match language.to_lowercase().as_str() {
        "python" | "python3" | "py" => ("python3", "py"),
        "javascript" | "js" | "node" => ("node", "js"),
        "bash" | "sh" | "shell" => ("bash", "sh"),
        "ruby" | "rb" => ("ruby", "rb"),
        other => return Err(AgentError::Validation(format!("unsupported script language: {other}"))),
    };

    let script_path =
        std::env::temp_dir().join(format!("agentcore-script-{}.{extension}", uuid::Uuid::now_v7()));
    tokio::fs::write(&script_path, content).await.map_err(AgentError::from)?;

    let command = format!("{interpreter} {}", script_path.display());
    let result = execute(environment, &serde_json::json!({"command": command})).await;

    let _ = tokio::fs::remove_file(&script_path).await;
    result
}

fn truncate_utf8(bytes: &[u8], max: usize) -> (String, bool) {
    if bytes.len() <= max {
        return (String::from_utf8_lossy(bytes).to_string(), false);
    }
    let mut idx = max;
    while idx > 0 && (bytes[idx] & 0b1100_0000) == 0b1000_0000 {
        idx -= 1;
    }
    (String::from_utf8_lossy(&bytes[..idx]).to_string(), true)
}
