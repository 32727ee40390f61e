//! StateManager — durable agent state snapshot (§4.6, §6).
//!
//! A single JSON document on disk, guarded by one mutex in memory; writes
//! use the same atomic-rename discipline as FILE_WRITE, with up to
//! `backup_retention` rotating `.bak.<timestamp>` copies. This replaces the
//! multi-entity actor/message-passing store this crate previously used —
//! the agent's state shape is narrow enough that one mutexed document
//! covers it without a command channel.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::TaskResult;

use super::messages::StateError;

pub const DEFAULT_HISTORY_SIZE: usize = 500;
pub const DEFAULT_BACKUP_RETENTION: usize = 7;

/// One entry in the bounded task-history ring (§3 Agent state snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub id: String,
    #[serde(default)]
    pub task_type: String,
    pub status: String,
    pub duration_ms: u64,
    pub start_time: String,
    #[serde(default)]
    pub name: String,
}

/// The on-disk document (§6 state file layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateDoc {
    pub agent_id: String,
    pub start_time: String,
    pub last_activity: String,
    pub total_tasks_executed: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    #[serde(default)]
    pub task_history: VecDeque<TaskHistoryEntry>,
    #[serde(default)]
    pub statistics: HashMap<String, Value>,
    #[serde(default)]
    pub configuration: HashMap<String, Value>,
}

impl AgentStateDoc {
    fn new(agent_id: String, now: String) -> Self {
        Self {
            agent_id,
            start_time: now.clone(),
            last_activity: now,
            total_tasks_executed: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            task_history: VecDeque::new(),
            statistics: HashMap::new(),
            configuration: HashMap::new(),
        }
    }
}

struct Inner {
    doc: AgentStateDoc,
    dirty: bool,
}

pub struct StateManager {
    path: PathBuf,
    history_size: usize,
    backup_retention: usize,
    inner: Mutex<Inner>,
}

impl StateManager {
    /// Loads `path` if it exists and parses; otherwise starts a fresh
    /// state document in memory (not yet written to disk).
    pub async fn load_or_create(
        path: impl Into<PathBuf>,
        history_size: usize,
        backup_retention: usize,
    ) -> Result<Self, StateError> {
        let path = path.into();
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<AgentStateDoc>(&content) {
                Ok(doc) => {
                    info!(path = %path.display(), "loaded agent state");
                    doc
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "agent state failed to parse, starting fresh");
                    AgentStateDoc::new(crate::domain::generate_id("agent", "agent"), now_iso())
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no existing agent state, starting fresh");
                AgentStateDoc::new(crate::domain::generate_id("agent", "agent"), now_iso())
            }
        };

        Ok(Self {
            path,
            history_size,
            backup_retention,
            inner: Mutex::new(Inner { doc, dirty: false }),
        })
    }

    /// Records a completed task's outcome into the history ring and
    /// updates counters. Called once, at terminal transition — never
    /// double-counted at dispatch.
    pub async fn record_task_result(&self, result: &TaskResult) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        inner.doc.total_tasks_executed += 1;
        if result.success {
            inner.doc.successful_tasks += 1;
        } else {
            inner.doc.failed_tasks += 1;
        }
        inner.doc.last_activity = now_iso();

        let task_type = result
            .metadata
            .get("taskType")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        inner.doc.task_history.push_back(TaskHistoryEntry {
            id: result.task_id.clone(),
            task_type,
            status: if result.success { "COMPLETED".to_string() } else { "FAILED".to_string() },
            duration_ms: result.duration_ms,
            start_time: now_iso(),
            name: result.task_id.clone(),
        });
        while inner.doc.task_history.len() > self.history_size {
            inner.doc.task_history.pop_front();
        }

        debug_assert!(inner.doc.successful_tasks + inner.doc.failed_tasks <= inner.doc.total_tasks_executed);
        inner.dirty = true;
        Ok(())
    }

    pub async fn snapshot(&self) -> AgentStateDoc {
        self.inner.lock().await.doc.clone()
    }

    pub async fn set_configuration(&self, configuration: HashMap<String, Value>) {
        let mut inner = self.inner.lock().await;
        inner.doc.configuration = configuration;
        inner.dirty = true;
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Atomically writes the current document to `path`, rotating backups
    /// of the previous on-disk version first.
    pub async fn save(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock().await;
        let json = serde_json::to_string_pretty(&inner.doc)?;

        if self.path.exists() {
            self.rotate_backup().await?;
        }

        atomic_write(&self.path, &json).await?;
        inner.dirty = false;
        Ok(())
    }

    async fn rotate_backup(&self) -> Result<(), StateError> {
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        let backup_path = PathBuf::from(format!("{}.bak.{}", self.path.display(), timestamp));
        tokio::fs::copy(&self.path, &backup_path).await?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let stem = self.path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
        let mut backups: Vec<PathBuf> = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with(&format!("{stem}.bak.")) {
                        backups.push(entry.path());
                    }
                }
            }
        }
        backups.sort();
        while backups.len() > self.backup_retention {
            let oldest = backups.remove(0);
            let _ = tokio::fs::remove_file(&oldest).await;
        }
        Ok(())
    }

    /// Spawns the state manager's single background autosave timer (§4.6):
    /// saves on `interval` whenever the document is dirty.
    pub fn spawn_autosave(self: std::sync::Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if self.is_dirty().await {
                    if let Err(e) = self.save().await {
                        warn!(error = %e, "autosave failed");
                    }
                }
            }
        })
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

async fn atomic_write(path: &Path, content: &str) -> Result<(), StateError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
        rand::random::<u32>()
    ));
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_or_create_fresh_when_missing() {
        let temp = tempdir().unwrap();
        let manager = StateManager::load_or_create(temp.path().join("state.json"), 500, 7).await.unwrap();
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.total_tasks_executed, 0);
    }

    #[tokio::test]
    async fn test_record_task_result_updates_counters() {
        let temp = tempdir().unwrap();
        let manager = StateManager::load_or_create(temp.path().join("state.json"), 500, 7).await.unwrap();
        manager.record_task_result(&TaskResult::ok("t1", serde_json::json!({}), 10, 1)).await.unwrap();
        manager.record_task_result(&TaskResult::err("t2", "boom", 5, 1)).await.unwrap();

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.total_tasks_executed, 2);
        assert_eq!(snapshot.successful_tasks, 1);
        assert_eq!(snapshot.failed_tasks, 1);
        assert_eq!(snapshot.task_history.len(), 2);
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrips() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        let manager = StateManager::load_or_create(&path, 500, 7).await.unwrap();
        manager.record_task_result(&TaskResult::ok("t1", serde_json::json!({}), 10, 1)).await.unwrap();
        manager.save().await.unwrap();

        let reloaded = StateManager::load_or_create(&path, 500, 7).await.unwrap();
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.total_tasks_executed, 1);
    }

    #[tokio::test]
    async fn test_save_rotates_backup_on_second_write() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        let manager = StateManager::load_or_create(&path, 500, 7).await.unwrap();
        manager.save().await.unwrap();
        manager.record_task_result(&TaskResult::ok("t1", serde_json::json!({}), 10, 1)).await.unwrap();
        manager.save().await.unwrap();

        let mut entries = tokio::fs::read_dir(temp.path()).await.unwrap();
        let mut backup_count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_str().unwrap().contains(".bak.") {
                backup_count += 1;
            }
        }
        assert_eq!(backup_count, 1);
    }

    #[tokio::test]
    async fn test_history_ring_evicts_oldest_beyond_capacity() {
        let temp = tempdir().unwrap();
        let manager = StateManager::load_or_create(temp.path().join("state.json"), 2, 7).await.unwrap();
        for i in 0..5 {
            manager
                .record_task_result(&TaskResult::ok(format!("t{i}"), serde_json::json!({}), 1, 1))
                .await
                .unwrap();
        }
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.task_history.len(), 2);
        assert_eq!(snapshot.task_history.back().unwrap().id, "t4");
    }
}
