//! Task domain type — the unit of work the queue schedules and the
//! executor carries out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::id::generate_id;
use super::priority::Priority;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The kind of work a task performs. Dispatch target for `TaskExecutor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    ShellCommand,
    FileRead,
    FileWrite,
    FileCopy,
    FileDelete,
    DirectoryScan,
    AiAnalysis,
    CodeGeneration,
    DecisionMaking,
    TextProcessing,
    ToolCall,
    ScriptExecution,
    Composite,
    HealthCheck,
    LogAnalysis,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).ok().and_then(|v| v.as_str().map(str::to_string));
        write!(f, "{}", s.unwrap_or_else(|| format!("{:?}", self)))
    }
}

/// Lifecycle status of a `Task`.
///
/// Terminal states: `Completed`, `Failed`, `Timeout`, `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Blocked,
    Ready,
    Running,
    Retrying,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).ok().and_then(|v| v.as_str().map(str::to_string));
        write!(f, "{}", s.unwrap_or_else(|| format!("{:?}", self)))
    }
}

/// Retry policy applied when a task's handler returns a retriable error.
///
/// Backoff is exponential starting at `base_delay_ms`, capped at 5 minutes
/// (see `capped_delay_ms`), doubling per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

const MAX_BACKOFF_MS: u64 = 5 * 60 * 1_000;

impl RetryPolicy {
    /// Delay before the given (1-indexed) retry attempt.
    pub fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        delay.min(MAX_BACKOFF_MS)
    }
}

/// A unit of schedulable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub params: Value,

    /// Task IDs that must reach `Completed` before this task becomes `Ready`.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Owning plan, if this task was produced by a plan's decomposition.
    pub plan_id: Option<String>,

    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub attempt: u32,

    pub timeout_ms: Option<u64>,

    pub last_error: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
    /// Monotonic submission sequence, used to break priority ties FIFO.
    pub sequence: u64,
}

impl Task {
    pub fn new(task_type: TaskType, title: impl Into<String>, params: Value) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id("task", &title),
            task_type,
            title,
            priority: Priority::default(),
            status: TaskStatus::Pending,
            params,
            depends_on: Vec::new(),
            plan_id: None,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            timeout_ms: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            sequence: 0,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = now_ms();
    }

    pub fn is_ready_given(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.depends_on.iter().all(|d| completed.contains(d))
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.retry_policy.max_attempts
    }

    pub fn next_backoff_ms(&self) -> u64 {
        self.retry_policy.capped_delay_ms(self.attempt)
    }
}

/// Outcome of running a `Task` to completion (or failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempt: u32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl TaskResult {
    pub fn ok(task_id: impl Into<String>, output: Value, duration_ms: u64, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            output,
            error: None,
            duration_ms,
            attempt,
            metadata: HashMap::new(),
        }
    }

    pub fn err(task_id: impl Into<String>, error: impl Into<String>, duration_ms: u64, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms,
            attempt,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new(TaskType::ShellCommand, "run tests", serde_json::json!({"command": "cargo test"}));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.depends_on.is_empty());
        assert!(task.id.contains("-task-"));
    }

    #[test]
    fn test_task_is_ready_given() {
        let task = Task::new(TaskType::FileRead, "read", Value::Null).with_depends_on(vec!["a".into(), "b".into()]);
        let mut completed = std::collections::HashSet::new();
        assert!(!task.is_ready_given(&completed));
        completed.insert("a".to_string());
        assert!(!task.is_ready_given(&completed));
        completed.insert("b".to_string());
        assert!(task.is_ready_given(&completed));
    }

    #[test]
    fn test_retry_policy_backoff_caps_at_five_minutes() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1_000,
        };
        assert_eq!(policy.capped_delay_ms(1), 1_000);
        assert_eq!(policy.capped_delay_ms(2), 2_000);
        assert_eq!(policy.capped_delay_ms(3), 4_000);
        // By attempt 10 the exponential would exceed the cap.
        assert_eq!(policy.capped_delay_ms(10), MAX_BACKOFF_MS);
    }

    #[test]
    fn test_task_can_retry() {
        let mut task = Task::new(TaskType::ShellCommand, "flaky", Value::Null);
        task.retry_policy.max_attempts = 2;
        assert!(task.can_retry());
        task.attempt = 2;
        assert!(!task.can_retry());
    }

    #[test]
    fn test_task_status_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_task_type_display_screaming_snake() {
        assert_eq!(TaskType::FileWrite.to_string(), "FILE_WRITE");
        assert_eq!(TaskType::AiAnalysis.to_string(), "AI_ANALYSIS");
    }

    #[test]
    fn test_task_result_serde_roundtrip() {
        let result = TaskResult::ok("task-1", serde_json::json!({"bytes": 12}), 42, 1);
        let json = serde_json::to_string(&result).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "task-1");
        assert!(back.success);
    }

    proptest! {
        /// Backoff is monotonically non-decreasing in the attempt number and
        /// never exceeds the 5-minute cap, for any base delay/attempt pair.
        #[test]
        fn prop_capped_delay_is_monotonic_and_capped(base_delay_ms in 1u64..=120_000, attempt in 1u32..=30) {
            let policy = RetryPolicy { max_attempts: 10, base_delay_ms };
            let this_delay = policy.capped_delay_ms(attempt);
            let next_delay = policy.capped_delay_ms(attempt + 1);

            prop_assert!(this_delay <= MAX_BACKOFF_MS);
            prop_assert!(next_delay >= this_delay);
        }
    }
}
