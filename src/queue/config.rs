//! TaskQueue configuration knobs, with field-level serde defaults so a
//! partial YAML document still produces sane values (mirrors the scheduler
//! config style this crate was built from).

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_concurrent() -> usize {
    8
}

fn default_dispatch_poll_ms() -> u64 {
    50
}

fn default_default_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// How often the dispatch loop wakes to re-check the heap even absent a
    /// notification (covers tasks whose dependency completion raced the
    /// `Notify`).
    #[serde(default = "default_dispatch_poll_ms")]
    pub dispatch_poll_ms: u64,

    /// Fallback timeout applied to a task with no `timeout_ms` of its own.
    #[serde(default = "default_default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            dispatch_poll_ms: default_dispatch_poll_ms(),
            default_timeout_ms: default_default_timeout_ms(),
        }
    }
}

impl TaskQueueConfig {
    pub fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TaskQueueConfig::default();
        assert_eq!(config.max_concurrent, 8);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: TaskQueueConfig = serde_yaml::from_str("max_concurrent: 4\n").unwrap();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.default_timeout_ms, 120_000);
    }
}
