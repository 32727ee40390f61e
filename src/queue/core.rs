//! TaskQueue — priority-ordered, dependency-aware task scheduler.
//!
//! Owns tasks from submission to terminal status (§3 Ownership). The
//! worker pool is internal: `start_processing` spawns `max_concurrent`
//! workers that pull the highest-priority ready task off a shared
//! `BinaryHeap`, hand it to the `TaskExecutor`, and apply the retry/backoff
//! policy on failure. Concurrency primitives (`Mutex` guarding a
//! `BinaryHeap` + `Notify` to wake waiters) are carried over from this
//! crate's rate-limiting scheduler.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskResult, TaskStatus};
use crate::error::AgentError;
use crate::executor::TaskExecutor;
use crate::state::StateManager;

use super::config::TaskQueueConfig;
use super::entry::ScheduledTask;

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStatistics {
    pub total_tasks: usize,
    pub pending: usize,
    pub blocked: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub average_latency_ms: f64,
    pub throughput_per_minute: f64,
}

struct QueueInner {
    tasks: HashMap<String, Task>,
    heap: BinaryHeap<ScheduledTask>,
    running: HashSet<String>,
    completed_ids: HashSet<String>,
    results: HashMap<String, TaskResult>,
    sequence: u64,
    completion_latencies_ms: Vec<u64>,
    first_submitted_at: Option<Instant>,
    completed_count: u64,
}

impl QueueInner {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            heap: BinaryHeap::new(),
            running: HashSet::new(),
            completed_ids: HashSet::new(),
            results: HashMap::new(),
            sequence: 0,
            completion_latencies_ms: Vec::new(),
            first_submitted_at: None,
            completed_count: 0,
        }
    }

    /// Push any task whose dependencies are now all satisfied onto the heap.
    fn promote_ready_tasks(&mut self) {
        let completed = self.completed_ids.clone();
        let promotable: Vec<String> = self
            .tasks
            .values()
            .filter(|t| {
                matches!(t.status, TaskStatus::Pending | TaskStatus::Blocked) && t.is_ready_given(&completed)
            })
            .map(|t| t.id.clone())
            .collect();

        for id in promotable {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.set_status(TaskStatus::Ready);
                self.heap.push(ScheduledTask(task.clone()));
            }
        }
    }
}

/// Priority task queue with a dependency DAG and an internal worker pool.
pub struct TaskQueue {
    config: TaskQueueConfig,
    inner: Mutex<QueueInner>,
    notify: Notify,
    executor: Arc<TaskExecutor>,
    state: Option<Arc<StateManager>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    stopping: Arc<tokio::sync::Notify>,
}

impl TaskQueue {
    pub fn new(config: TaskQueueConfig, executor: Arc<TaskExecutor>, state: Option<Arc<StateManager>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(QueueInner::new()),
            notify: Notify::new(),
            executor,
            state,
            worker_handles: Mutex::new(Vec::new()),
            stopping: Arc::new(tokio::sync::Notify::new()),
        })
    }

    /// Validates and admits a task. Returns its id.
    pub async fn submit(&self, mut task: Task) -> Result<String, AgentError> {
        self.executor.validate(&task)?;

        let mut inner = self.inner.lock().await;
        inner.sequence += 1;
        task.sequence = inner.sequence;
        if inner.first_submitted_at.is_none() {
            inner.first_submitted_at = Some(Instant::now());
        }

        let id = task.id.clone();
        let completed = inner.completed_ids.clone();
        if task.depends_on.iter().all(|d| completed.contains(d)) {
            task.set_status(TaskStatus::Ready);
            inner.heap.push(ScheduledTask(task.clone()));
        } else {
            task.set_status(TaskStatus::Blocked);
        }

        inner.tasks.insert(id.clone(), task);
        drop(inner);

        self.notify.notify_waiters();
        Ok(id)
    }

    /// Cancels a task that is not RUNNING or terminal.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.running.contains(id) {
            return false;
        }
        match inner.tasks.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.set_status(TaskStatus::Cancelled);
                inner.heap = inner.heap.iter().filter(|s| s.0.id != id).cloned().collect();
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    pub async fn get_all(&self) -> Vec<Task> {
        self.inner.lock().await.tasks.values().cloned().collect()
    }

    /// Fetches the `TaskResult` left behind by a task's last terminal
    /// attempt, for callers (chiefly the Planner's Observe step) that need
    /// more than the status `Task` itself carries.
    /// The shared state handle this queue records completions into, if any.
    pub fn state(&self) -> Option<&Arc<StateManager>> {
        self.state.as_ref()
    }

    pub async fn get_result(&self, id: &str) -> Option<TaskResult> {
        self.inner.lock().await.results.get(id).cloned()
    }

    /// Submits `task` and polls until it reaches a terminal status or
    /// `timeout` elapses, returning the last known `TaskResult`.
    pub async fn submit_and_wait(&self, task: Task, timeout: Duration) -> Result<TaskResult, AgentError> {
        let id = self.submit(task).await?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(t) = self.get(&id).await {
                if t.status.is_terminal() {
                    return Ok(self
                        .get_result(&id)
                        .await
                        .unwrap_or_else(|| TaskResult::err(&id, "task reached a terminal status with no result", 0, t.attempt)));
                }
            }
            if Instant::now() >= deadline {
                return Ok(TaskResult::err(&id, format!("timed out waiting for task after {}ms", timeout.as_millis()), timeout.as_millis() as u64, 0));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn get_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.inner
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> QueueStatistics {
        let inner = self.inner.lock().await;
        let mut stats = QueueStatistics {
            total_tasks: inner.tasks.len(),
            ..Default::default()
        };
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::Ready => stats.ready += 1,
                TaskStatus::Running | TaskStatus::Retrying => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Timeout => stats.timed_out += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        if !inner.completion_latencies_ms.is_empty() {
            let sum: u64 = inner.completion_latencies_ms.iter().sum();
            stats.average_latency_ms = sum as f64 / inner.completion_latencies_ms.len() as f64;
        }
        if let Some(first) = inner.first_submitted_at {
            let minutes = first.elapsed().as_secs_f64() / 60.0;
            if minutes > 0.0 {
                stats.throughput_per_minute = inner.completed_count as f64 / minutes;
            }
        }
        stats
    }

    /// Spawns `max_concurrent` workers pulling from the shared heap.
    pub fn start_processing(self: &Arc<Self>) {
        let mut handles = Vec::with_capacity(self.config.max_concurrent);
        for worker_id in 0..self.config.max_concurrent {
            let queue = Arc::clone(self);
            handles.push(tokio::spawn(async move { queue.worker_loop(worker_id).await }));
        }
        // Fire-and-forget: store synchronously via try_lock since no worker
        // could have started yet to contend for it.
        if let Ok(mut guard) = self.worker_handles.try_lock() {
            *guard = handles;
        }
        info!(workers = self.config.max_concurrent, "TaskQueue started");
    }

    /// Waits up to `grace_period` for RUNNING tasks to finish, then cancels
    /// the remainder and stops all workers.
    pub async fn stop_processing(&self, grace_period: Duration) {
        self.stopping.notify_waiters();
        let deadline = Instant::now() + grace_period;
        loop {
            if self.inner.lock().await.running.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut inner = self.inner.lock().await;
        let still_running: Vec<String> = inner.running.iter().cloned().collect();
        for id in still_running {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.set_status(TaskStatus::Cancelled);
            }
        }
        drop(inner);

        let mut handles = self.worker_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        info!("TaskQueue stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        loop {
            let task = {
                let mut inner = self.inner.lock().await;
                inner.heap.pop()
            };

            let Some(ScheduledTask(mut task)) = task else {
                tokio::select! {
                    _ = self.notify.notified() => continue,
                    _ = tokio::time::sleep(self.config.dispatch_poll()) => continue,
                    _ = self.stopping.notified() => return,
                }
            };

            if task.status.is_terminal() {
                continue;
            }

            {
                let mut inner = self.inner.lock().await;
                inner.running.insert(task.id.clone());
            }

            task.set_status(TaskStatus::Running);
            task.attempt += 1;
            debug!(worker_id, task_id = %task.id, attempt = task.attempt, "dispatching task");

            let timeout_ms = task.timeout_ms.unwrap_or(self.config.default_timeout_ms);
            let started = Instant::now();
            let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), self.executor.execute(&task))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    let mut result =
                        TaskResult::err(task.id.clone(), format!("timed out after {timeout_ms}ms"), timeout_ms, task.attempt);
                    result.metadata.insert("errorKind".into(), Value::String("Timeout".into()));
                    result.metadata.insert("exitCode".into(), Value::from(-1));
                    result
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            self.clone().finish_task(task, result, elapsed_ms).await;
        }
    }

    async fn finish_task(self: Arc<Self>, mut task: Task, result: TaskResult, elapsed_ms: u64) {
        let mut inner = self.inner.lock().await;
        inner.running.remove(&task.id);
        inner.results.insert(task.id.clone(), result.clone());

        if result.success {
            task.set_status(TaskStatus::Completed);
            inner.completed_ids.insert(task.id.clone());
            inner.completion_latencies_ms.push(elapsed_ms);
            inner.completed_count += 1;
        } else if result.metadata.get("errorKind").and_then(|v| v.as_str()) == Some("Timeout") {
            task.set_error(result.error.clone().unwrap_or_default());
            task.set_status(TaskStatus::Timeout);
            warn!(task_id = %task.id, timeout_ms = ?task.timeout_ms, "task timed out");
        } else {
            task.set_error(result.error.clone().unwrap_or_default());
            if task.can_retry() {
                task.set_status(TaskStatus::Retrying);
                let backoff = task.next_backoff_ms();
                inner.tasks.insert(task.id.clone(), task.clone());
                drop(inner);

                let queue = Arc::clone(&self);
                let retry_task = task.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    queue.requeue_retry(retry_task).await;
                });

                if let Some(ref state) = self.state {
                    state.record_task_result(&result).await.ok();
                }
                return;
            }
            task.set_status(TaskStatus::Failed);
            warn!(task_id = %task.id, error = ?result.error, "task failed permanently");
        }

        inner.tasks.insert(task.id.clone(), task);
        inner.promote_ready_tasks();
        drop(inner);

        if let Some(ref state) = self.state {
            state.record_task_result(&result).await.ok();
        }

        self.notify.notify_waiters();
    }

    /// Re-pushes a task onto the heap once its retry backoff has elapsed.
    async fn requeue_retry(self: Arc<Self>, mut task: Task) {
        let mut inner = self.inner.lock().await;
        if task.status == TaskStatus::Cancelled {
            return;
        }
        task.set_status(TaskStatus::Ready);
        inner.heap.push(ScheduledTask(task.clone()));
        inner.tasks.insert(task.id.clone(), task);
        drop(inner);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskType};
    use serde_json::json;

    fn make_queue() -> Arc<TaskQueue> {
        TaskQueue::new(TaskQueueConfig::default(), Arc::new(TaskExecutor::for_tests()), None)
    }

    #[tokio::test]
    async fn test_submit_ready_task_has_ready_status() {
        let queue = make_queue();
        let task = Task::new(TaskType::ShellCommand, "echo", json!({"command": "echo hi"}));
        let id = queue.submit(task).await.unwrap();
        let stored = queue.get(&id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn test_submit_blocked_task_waits_on_dependency() {
        let queue = make_queue();
        let dependent = Task::new(TaskType::ShellCommand, "dependent", json!({"command": "echo hi"}))
            .with_depends_on(vec!["missing-dep".to_string()]);
        let id = queue.submit(dependent).await.unwrap();
        let stored = queue.get(&id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_cancel_pending_task() {
        let queue = make_queue();
        let task = Task::new(TaskType::ShellCommand, "echo", json!({"command": "echo hi"}));
        let id = queue.submit(task).await.unwrap();
        assert!(queue.cancel(&id).await);
        let stored = queue.get(&id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_statistics_counts_by_status() {
        let queue = make_queue();
        queue
            .submit(Task::new(TaskType::ShellCommand, "a", json!({"command": "echo a"})))
            .await
            .unwrap();
        queue
            .submit(
                Task::new(TaskType::ShellCommand, "b", json!({"command": "echo b"})).with_priority(Priority::High),
            )
            .await
            .unwrap();
        let stats = queue.statistics().await;
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.ready, 2);
    }

    #[tokio::test]
    async fn test_timed_out_task_reaches_timeout_status_without_retry_delay() {
        let queue = make_queue();
        let task = Task::new(TaskType::ShellCommand, "sleeper", json!({"command": "sleep 10", "timeoutMs": 200}))
            .with_timeout_ms(200);
        let id = queue.submit(task).await.unwrap();
        queue.start_processing();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
        loop {
            let stored = queue.get(&id).await.unwrap();
            if stored.status.is_terminal() {
                assert_eq!(stored.status, TaskStatus::Timeout);
                let result = queue.get_result(&id).await.unwrap();
                assert_eq!(result.metadata.get("exitCode").and_then(|v| v.as_i64()), Some(-1));
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "task did not reach TIMEOUT within 2x timeout");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        queue.stop_processing(Duration::from_millis(100)).await;
    }
}
