//! Agent Service — the composition root (§6 Agent Service API).
//!
//! Wires the Environment, AI Adapter, Tool Adapter, StateManager, TaskQueue,
//! and Planner from a [`Config`](crate::config::Config) and exposes the
//! narrow surface (`start`, `stop`, `submit_task`, `status`, `create_plan`,
//! `execute_plan`, `list_plans`) that a CLI, or any other front end, drives.
//! The CLI itself is a thin caller of this API, not part of the core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{AgentMode, Config};
use crate::domain::{ExecutionPlan, PlanExecution, Task};
use crate::environment::Environment;
use crate::error::AgentError;
use crate::executor::TaskExecutor;
use crate::llm::{self, LlmClient};
use crate::planner::Planner;
use crate::queue::{QueueStatistics, TaskQueue, TaskQueueConfig};
use crate::state::{AgentStateDoc, StateManager};
use crate::tools::ToolExecutor;

/// Everything `Agent::new` needs, already resolved from a [`Config`] — kept
/// distinct from `Config` so callers can construct an agent without going
/// through file-based configuration loading (e.g. from tests).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub max_concurrent_tasks: usize,
    pub execution_interval_ms: u64,
    pub shutdown_timeout: Duration,
    pub state_path: std::path::PathBuf,
    pub backup_retention: usize,
    pub history_size: usize,
    pub allow_root: std::path::PathBuf,
    pub llm: crate::config::LlmConfig,
}

impl From<&Config> for AgentConfig {
    fn from(config: &Config) -> Self {
        let allow_root = config
            .agent
            .allow_roots
            .first()
            .cloned()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from(".")));
        Self {
            mode: config.agent.mode,
            max_concurrent_tasks: config.agent.max_concurrent_tasks,
            execution_interval_ms: config.agent.execution_interval_ms,
            shutdown_timeout: Duration::from_secs(config.agent.shutdown.timeout_seconds),
            state_path: config.agent.state_path.clone(),
            backup_retention: config.agent.backup_retention_days as usize,
            history_size: config.agent.history_size,
            allow_root,
            llm: config.ai.clone(),
        }
    }
}

/// A point-in-time view of the agent, returned by [`Agent::status`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub mode: AgentMode,
    pub queue: QueueStatistics,
    pub state: AgentStateDoc,
}

/// Owns the composed subsystems for one running agent and their lifecycle.
pub struct Agent {
    config: AgentConfig,
    environment: Arc<Environment>,
    llm: Arc<dyn LlmClient>,
    state: Arc<StateManager>,
    queue: Arc<TaskQueue>,
    planner: Arc<Planner>,
    autosave: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    /// Composes every subsystem without starting the worker pool or
    /// autosave timer; call [`Agent::start`] to bring it up.
    pub async fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let environment = Arc::new(Environment::new(config.allow_root.clone()));
        let llm = llm::create_client(&config.llm)?;
        let tools = Arc::new(ToolExecutor::standard());
        let executor = Arc::new(TaskExecutor::new(Arc::clone(&environment), tools, Some(Arc::clone(&llm))));

        let state = Arc::new(
            StateManager::load_or_create(config.state_path.clone(), config.history_size, config.backup_retention).await?,
        );
        state
            .set_configuration(HashMap::from([
                ("mode".to_string(), Value::String(config.mode_str())),
                ("maxConcurrentTasks".to_string(), Value::from(config.max_concurrent_tasks)),
            ]))
            .await;

        let queue_config = TaskQueueConfig {
            max_concurrent: config.max_concurrent_tasks,
            ..TaskQueueConfig::default()
        };
        let queue = TaskQueue::new(queue_config, executor, Some(Arc::clone(&state)));

        let planner = Arc::new(Planner::new(Arc::clone(&environment), Arc::clone(&llm), Arc::clone(&queue)));

        Ok(Self {
            config,
            environment,
            llm,
            state,
            queue,
            planner,
            autosave: tokio::sync::Mutex::new(None),
        })
    }

    /// Starts the worker pool and the background autosave timer.
    pub async fn start(&self) {
        if !self.config.mode.is_enabled_mode() {
            info!(mode = ?self.config.mode, "agent mode does not auto-start the worker pool");
        }
        self.queue.start_processing();
        let handle = Arc::clone(&self.state).spawn_autosave(Duration::from_millis(self.config.execution_interval_ms));
        *self.autosave.lock().await = Some(handle);
        info!(max_concurrent = self.config.max_concurrent_tasks, "agent started");
    }

    /// Stops the worker pool (waiting up to the configured shutdown
    /// timeout for running tasks to finish), the autosave timer, and
    /// flushes state to disk.
    pub async fn stop(&self) -> Result<(), AgentError> {
        self.queue.stop_processing(self.config.shutdown_timeout).await;
        if let Some(handle) = self.autosave.lock().await.take() {
            handle.abort();
        }
        self.state.save().await?;
        info!("agent stopped");
        Ok(())
    }

    /// Admits a task directly onto the queue, bypassing planning.
    pub async fn submit_task(&self, task: Task) -> Result<String, AgentError> {
        self.queue.submit(task).await
    }

    /// A snapshot of queue statistics and durable state, for CLI `status`.
    pub async fn status(&self) -> AgentStatus {
        AgentStatus {
            mode: self.config.mode,
            queue: self.queue.statistics().await,
            state: self.state.snapshot().await,
        }
    }

    pub async fn create_plan(&self, goal: impl Into<String>, context: HashMap<String, Value>) -> Result<ExecutionPlan, AgentError> {
        self.planner.create_plan(goal, context).await
    }

    pub async fn execute_plan(&self, plan_id: &str) -> Result<PlanExecution, AgentError> {
        self.planner.execute_plan(plan_id).await
    }

    pub async fn list_plans(&self) -> Vec<ExecutionPlan> {
        self.planner.list_plans().await
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<ExecutionPlan> {
        self.planner.get_plan(plan_id).await
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }
}

impl AgentConfig {
    fn mode_str(&self) -> String {
        match self.mode {
            AgentMode::Interactive => "INTERACTIVE",
            AgentMode::Autonomous => "AUTONOMOUS",
            AgentMode::Supervised => "SUPERVISED",
            AgentMode::Manual => "MANUAL",
        }
        .to_string()
    }
}

impl AgentMode {
    fn is_enabled_mode(&self) -> bool {
        !matches!(self, AgentMode::Manual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(state_path: std::path::PathBuf) -> AgentConfig {
        AgentConfig {
            mode: AgentMode::Autonomous,
            max_concurrent_tasks: 2,
            execution_interval_ms: 60_000,
            shutdown_timeout: Duration::from_secs(1),
            state_path,
            backup_retention: 2,
            history_size: 10,
            allow_root: std::env::temp_dir(),
            llm: crate::config::LlmConfig {
                api_key_env: "AGENTCORE_TEST_API_KEY".to_string(),
                ..crate::config::LlmConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_agent_new_composes_subsystems() {
        unsafe { std::env::set_var("AGENTCORE_TEST_API_KEY", "test-key") };
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(test_config(dir.path().join("state.json"))).await.unwrap();
        let status = agent.status().await;
        assert_eq!(status.queue.total_tasks, 0);
    }

    #[tokio::test]
    async fn test_start_then_stop_flushes_state() {
        unsafe { std::env::set_var("AGENTCORE_TEST_API_KEY", "test-key") };
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let agent = Agent::new(test_config(state_path.clone())).await.unwrap();
        agent.start().await;
        agent.stop().await.unwrap();
        assert!(state_path.exists());
    }
}
