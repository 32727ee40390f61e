//! Durable agent state — a single mutexed JSON document (§4.6, §6).

mod manager;
mod messages;

pub use manager::{AgentStateDoc, DEFAULT_BACKUP_RETENTION, DEFAULT_HISTORY_SIZE, StateManager, TaskHistoryEntry};
pub use messages::{StateError, StateResponse};
