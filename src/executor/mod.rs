//! TaskExecutor — maps a dequeued `Task` to its typed handler (§4.3).
//!
//! `TaskQueue` depends on this to invoke handlers; it does not know task
//! semantics beyond dispatch-by-type.

mod ai;
mod file;
mod merge;
mod shell;
mod tool_call;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Task, TaskResult, TaskType};
use crate::environment::Environment;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::tools::ToolExecutor;

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, AgentError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation(format!("missing required parameter `{key}`")))
}

fn require_any_str(params: &Value, keys: &[&str]) -> Result<(), AgentError> {
    if keys
        .iter()
        .any(|k| params.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()).is_some())
    {
        Ok(())
    } else {
        Err(AgentError::Validation(format!(
            "one of {keys:?} is required"
        )))
    }
}

/// Default timeout by task type (§3), used when a `Task` doesn't override it.
pub fn default_timeout_ms(task_type: TaskType) -> u64 {
    match task_type {
        TaskType::ShellCommand | TaskType::ScriptExecution | TaskType::ToolCall => 30_000,
        TaskType::FileRead
        | TaskType::FileWrite
        | TaskType::FileCopy
        | TaskType::FileDelete
        | TaskType::DirectoryScan
        | TaskType::LogAnalysis
        | TaskType::HealthCheck => 5_000,
        TaskType::AiAnalysis | TaskType::CodeGeneration | TaskType::DecisionMaking | TaskType::TextProcessing => 60_000,
        TaskType::Composite => 120_000,
    }
}

/// Dispatches a dequeued `Task` to the handler for its `TaskType`, validating
/// required parameters before any side effect runs.
pub struct TaskExecutor {
    environment: Arc<Environment>,
    tools: Arc<ToolExecutor>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl TaskExecutor {
    pub fn new(environment: Arc<Environment>, tools: Arc<ToolExecutor>, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { environment, tools, llm }
    }

    /// An executor with no AI Adapter wired, for queue/tool-only tests.
    pub fn for_tests() -> Self {
        Self {
            environment: Arc::new(Environment::new(std::env::temp_dir())),
            tools: Arc::new(ToolExecutor::standard()),
            llm: None,
        }
    }

    pub fn default_timeout_ms(&self, task_type: TaskType) -> u64 {
        default_timeout_ms(task_type)
    }

    /// Rejects tasks missing required parameters for their declared type
    /// (§4.3), before admission to the queue.
    pub fn validate(&self, task: &Task) -> Result<(), AgentError> {
        let p = &task.params;
        match task.task_type {
            TaskType::ShellCommand => {
                require_str(p, "command")?;
            }
            TaskType::ScriptExecution => {
                require_str(p, "scriptContent")?;
                require_str(p, "language")?;
            }
            TaskType::FileRead | TaskType::FileDelete => {
                require_str(p, "filePath")?;
            }
            TaskType::FileWrite => {
                require_str(p, "filePath")?;
                require_str(p, "content")?;
            }
            TaskType::FileCopy => {
                require_str(p, "sourcePath")?;
                require_str(p, "targetPath")?;
            }
            TaskType::DirectoryScan => {
                require_str(p, "directoryPath")?;
            }
            TaskType::AiAnalysis | TaskType::CodeGeneration | TaskType::DecisionMaking | TaskType::TextProcessing => {
                require_any_str(p, &["prompt", "content", "question", "text"])?;
            }
            TaskType::ToolCall => {
                require_str(p, "toolName")?;
            }
            TaskType::Composite => {
                if !p.get("steps").map(Value::is_array).unwrap_or(false) {
                    return Err(AgentError::Validation("composite task requires `steps` array".into()));
                }
            }
            TaskType::HealthCheck => {}
            TaskType::LogAnalysis => {
                require_str(p, "logFile")?;
            }
        }
        Ok(())
    }

    /// Runs the handler for `task`'s type, always returning a `TaskResult` —
    /// callers decide retry eligibility from the embedded `errorKind`.
    pub async fn execute(&self, task: &Task) -> TaskResult {
        let start = Instant::now();
        debug!(task_id = %task.id, task_type = %task.task_type, "executing task");

        if let Err(e) = self.validate(task) {
            return TaskResult::err(&task.id, e.to_string(), elapsed_ms(start), task.attempt);
        }

        let outcome = self.dispatch(task).await;

        match outcome {
            Ok(output) => {
                let mut result = TaskResult::ok(&task.id, output, elapsed_ms(start), task.attempt);
                result
                    .metadata
                    .insert("taskType".into(), Value::String(task.task_type.to_string()));
                result
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "task handler failed");
                let mut result = TaskResult::err(&task.id, e.to_string(), elapsed_ms(start), task.attempt);
                result
                    .metadata
                    .insert("errorKind".into(), Value::String(format!("{:?}", e.kind())));
                if e.kind() == crate::error::ErrorKind::Timeout {
                    result.metadata.insert("exitCode".into(), Value::from(-1));
                }
                result
            }
        }
    }

    async fn dispatch(&self, task: &Task) -> Result<Value, AgentError> {
        match task.task_type {
            TaskType::ShellCommand => shell::execute(&self.environment, &task.params).await,
            TaskType::ScriptExecution => shell::execute_script(&self.environment, &task.params).await,
            TaskType::FileRead => file::read(&self.environment, &task.params).await,
            TaskType::FileWrite => file::write(&self.environment, &task.params).await,
            TaskType::FileCopy => file::copy(&self.environment, &task.params).await,
            TaskType::FileDelete => file::delete(&self.environment, &task.params).await,
            TaskType::DirectoryScan => file::scan_directory(&self.environment, &task.params).await,
            TaskType::AiAnalysis | TaskType::CodeGeneration | TaskType::DecisionMaking | TaskType::TextProcessing => {
                ai::execute(self.llm.as_ref(), task.task_type, &task.params).await
            }
            TaskType::ToolCall => tool_call::execute(&self.tools, &self.environment, &task.params).await,
            TaskType::HealthCheck => Ok(serde_json::json!({ "status": "ok" })),
            TaskType::LogAnalysis => file::analyze_log(&self.environment, &task.params).await,
            TaskType::Composite => self.execute_composite(&task.params).await,
        }
    }

    /// COMPOSITE: runs `steps` sequentially, short-circuiting on the first
    /// failure unless `continueOnError` is set.
    fn execute_composite<'a>(
        &'a self,
        params: &'a Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, AgentError>> + Send + 'a>> {
        Box::pin(async move {
            let steps = params
                .get("steps")
                .and_then(Value::as_array)
                .ok_or_else(|| AgentError::Validation("composite task requires `steps` array".into()))?;
            let continue_on_error = params.get("continueOnError").and_then(Value::as_bool).unwrap_or(false);

            let mut outputs = Vec::with_capacity(steps.len());
            for (idx, step) in steps.iter().enumerate() {
                let type_name = step
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::Validation(format!("composite step {idx} missing `type`")))?;
                let task_type: TaskType = serde_json::from_value(Value::String(type_name.to_string()))
                    .map_err(|e| AgentError::Validation(format!("composite step {idx} has unknown type: {e}")))?;
                let step_params = step.get("parameters").cloned().unwrap_or(Value::Null);
                let sub_task = Task::new(task_type, format!("composite step {idx}"), step_params);

                let result = self.execute(&sub_task).await;
                if !result.success && !continue_on_error {
                    return Err(AgentError::ProcessError(
                        result.error.unwrap_or_else(|| "composite step failed".into()),
                    ));
                }
                outputs.push(serde_json::json!({
                    "step": idx,
                    "success": result.success,
                    "output": result.output,
                }));
            }
            Ok(Value::Array(outputs))
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
