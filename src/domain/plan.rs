//! ExecutionPlan and SubTask — the Planner's static plan representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::id::generate_id;
use super::priority::Priority;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

/// How a FILE_WRITE subtask should reconcile new content against what's on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationMode {
    Create,
    Replace,
    Modify,
    Append,
    #[default]
    Auto,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).ok().and_then(|v| v.as_str().map(str::to_string));
        write!(f, "{}", s.unwrap_or_else(|| format!("{:?}", self)))
    }
}

impl std::str::FromStr for OperationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "REPLACE" => Ok(Self::Replace),
            "MODIFY" => Ok(Self::Modify),
            "APPEND" => Ok(Self::Append),
            "AUTO" => Ok(Self::Auto),
            _ => Err(()),
        }
    }
}

/// A plan node produced by decomposition. Not itself a `Task` — the
/// Planner derives one action `Task` per ReAct cycle from the current
/// subtask (see `planner::react`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub description: String,
    pub expected_outcome: String,
    pub priority: Priority,
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<String>,

    // Pre-declared execution hints, populated from the decomposition response.
    #[serde(default)]
    pub commands: Vec<String>,
    pub code_language: Option<String>,
    pub code_content: Option<String>,
    pub file_path: Option<String>,
    pub file_content: Option<String>,
    #[serde(default)]
    pub operation_mode: OperationMode,

    /// Populated by `Planner::load_file_context` before execution.
    pub original_file_content: Option<String>,
    #[serde(default)]
    pub file_exists: bool,
}

impl SubTask {
    pub fn new(description: impl Into<String>, expected_outcome: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            id: generate_id("subtask", &description),
            description,
            expected_outcome: expected_outcome.into(),
            priority: Priority::Medium,
            complexity: Complexity::Moderate,
            dependencies: Vec::new(),
            commands: Vec::new(),
            code_language: None,
            code_content: None,
            file_path: None,
            file_content: None,
            operation_mode: OperationMode::Auto,
            original_file_content: None,
            file_exists: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    #[default]
    Created,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The strategy summary attached to an `ExecutionPlan`: ordering rationale,
/// parallelism opportunities, and risk notes surfaced during decomposition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStrategy {
    pub ordering_notes: String,
    #[serde(default)]
    pub parallelizable_subtask_ids: Vec<String>,
    pub risk_notes: String,
}

/// Static plan produced by `Planner::create_plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub goal: String,
    pub sub_tasks: Vec<SubTask>,
    pub strategy: PlanStrategy,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub status: PlanStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ExecutionPlan {
    pub fn new(goal: impl Into<String>, sub_tasks: Vec<SubTask>) -> Self {
        let goal = goal.into();
        let now = now_ms();
        Self {
            id: generate_id("plan", &goal),
            goal,
            sub_tasks,
            strategy: PlanStrategy::default(),
            context: HashMap::new(),
            status: PlanStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: PlanStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn subtask(&self, id: &str) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|s| s.id == id)
    }

    /// Subtasks in an order that honors declared dependencies: a topological
    /// sort with ties broken by original declaration order, so
    /// dependency-free subtasks that could run in parallel still appear in a
    /// deterministic sequence for the (currently sequential) ReAct driver.
    pub fn ordered_subtask_ids(&self) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::new();
        let mut remaining: Vec<&SubTask> = self.sub_tasks.iter().collect();

        while !remaining.is_empty() {
            let resolved_set: std::collections::HashSet<&str> = resolved.iter().map(|s| s.as_str()).collect();
            let next_idx = remaining
                .iter()
                .position(|s| s.dependencies.iter().all(|d| resolved_set.contains(d.as_str())));

            match next_idx {
                Some(idx) => {
                    let subtask = remaining.remove(idx);
                    resolved.push(subtask.id.clone());
                }
                None => {
                    // Circular or missing dependency: fall back to declaration order
                    // for whatever is left rather than deadlocking the planner.
                    for s in remaining {
                        resolved.push(s.id.clone());
                    }
                    break;
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_new_defaults() {
        let plan = ExecutionPlan::new("add oauth", vec![SubTask::new("write handler", "handler compiles")]);
        assert_eq!(plan.status, PlanStatus::Created);
        assert_eq!(plan.sub_tasks.len(), 1);
        assert!(plan.id.contains("-plan-"));
    }

    #[test]
    fn test_ordered_subtask_ids_respects_dependencies() {
        let mut a = SubTask::new("mkdir scratch", "directory exists");
        a.id = "a".into();
        let mut b = SubTask::new("write file", "file written");
        b.id = "b".into();
        b.dependencies = vec!["a".into()];
        let mut c = SubTask::new("read file", "content matches");
        c.id = "c".into();
        c.dependencies = vec!["b".into()];

        // Declared out of dependency order to exercise the sort.
        let plan = ExecutionPlan::new("pipeline", vec![c, a, b]);
        let order = plan.ordered_subtask_ids();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ordered_subtask_ids_breaks_cycles_without_hanging() {
        let mut a = SubTask::new("a", "a done");
        a.id = "a".into();
        a.dependencies = vec!["b".into()];
        let mut b = SubTask::new("b", "b done");
        b.id = "b".into();
        b.dependencies = vec!["a".into()];

        let plan = ExecutionPlan::new("cyclic", vec![a, b]);
        let order = plan.ordered_subtask_ids();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_plan_status_is_terminal() {
        assert!(PlanStatus::Completed.is_terminal());
        assert!(!PlanStatus::Executing.is_terminal());
    }
}
