//! End-to-end integration tests for agentcore's Agent Service surface.

use std::time::Duration;

use agentcore::agent::{Agent, AgentConfig};
use agentcore::config::{AgentMode, LlmConfig};
use agentcore::domain::{Task, TaskType};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

fn test_agent_config(state_path: std::path::PathBuf) -> AgentConfig {
    AgentConfig {
        mode: AgentMode::Autonomous,
        max_concurrent_tasks: 2,
        execution_interval_ms: 60_000,
        shutdown_timeout: Duration::from_secs(2),
        state_path,
        backup_retention: 2,
        history_size: 20,
        allow_root: std::env::temp_dir(),
        llm: LlmConfig {
            api_key_env: "AGENTCORE_INTEGRATION_TEST_KEY".to_string(),
            ..LlmConfig::default()
        },
    }
}

#[tokio::test]
#[serial]
async fn test_agent_lifecycle_start_submit_stop() {
    unsafe { std::env::set_var("AGENTCORE_INTEGRATION_TEST_KEY", "test-key") };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let agent = Agent::new(test_agent_config(temp_dir.path().join("state.json")))
        .await
        .expect("agent should compose");

    agent.start().await;

    let task = Task::new(TaskType::FileRead, "read a file", json!({ "filePath": "Cargo.toml" }));
    let task_id = agent.submit_task(task).await.expect("submit should succeed");
    assert!(!task_id.is_empty());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = agent.status().await;
        if status.queue.completed + status.queue.failed >= 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "task did not reach a terminal state in time");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    agent.stop().await.expect("agent should stop cleanly");
    assert!(temp_dir.path().join("state.json").exists(), "state should be flushed on stop");
}

#[tokio::test]
#[serial]
async fn test_agent_rejects_invalid_task_type_at_submit() {
    unsafe { std::env::set_var("AGENTCORE_INTEGRATION_TEST_KEY", "test-key") };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let agent = Agent::new(test_agent_config(temp_dir.path().join("state.json")))
        .await
        .expect("agent should compose");

    // FILE_READ requires a `path` parameter; submitting without one should
    // be rejected by the executor's validation before it ever runs.
    let task = Task::new(TaskType::FileRead, "missing path", json!({}));
    let result = agent.submit_task(task).await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn test_agent_state_persists_across_restarts() {
    unsafe { std::env::set_var("AGENTCORE_INTEGRATION_TEST_KEY", "test-key") };
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let state_path = temp_dir.path().join("state.json");

    let agent_id = {
        let agent = Agent::new(test_agent_config(state_path.clone())).await.expect("agent should compose");
        agent.start().await;
        let status = agent.status().await;
        agent.stop().await.expect("agent should stop cleanly");
        status.state.agent_id
    };

    let agent = Agent::new(test_agent_config(state_path)).await.expect("agent should reload");
    let status = agent.status().await;
    assert_eq!(status.state.agent_id, agent_id, "reloaded agent should keep the same identity");
}
