//! PlanExecution — the mutable runtime record a Planner drives through
//! ReAct cycles, and its constituent ExecutionStep/ActionSpec types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::plan::PlanStatus;
use super::task::TaskType;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

/// A desugared, executor-bound form of an action chosen by reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action_type: TaskType,
    pub action_description: String,
    pub parameters: HashMap<String, Value>,
    pub expected_outcome: String,
}

/// One ReAct cycle against one subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub sub_task_id: String,
    pub reasoning: String,
    pub action: Option<ActionSpec>,
    pub observation: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub should_replan: bool,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl ExecutionStep {
    pub fn new(sub_task_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            sub_task_id: sub_task_id.into(),
            reasoning: reasoning.into(),
            action: None,
            observation: None,
            status: StepStatus::Running,
            should_replan: false,
            started_at: now_ms(),
            completed_at: None,
        }
    }

    pub fn finish(&mut self, status: StepStatus, observation: impl Into<String>) {
        self.status = status;
        self.observation = Some(observation.into());
        self.completed_at = Some(now_ms());
    }
}

/// Mutable runtime record for one plan's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecution {
    pub plan_id: String,
    pub status: PlanStatus,
    pub steps: Vec<ExecutionStep>,
    #[serde(default)]
    pub working_memory: HashMap<String, Value>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl PlanExecution {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            status: PlanStatus::Executing,
            steps: Vec::new(),
            working_memory: HashMap::new(),
            started_at: now_ms(),
            completed_at: None,
        }
    }

    pub fn record_step(&mut self, step: ExecutionStep) {
        self.steps.push(step);
    }

    pub fn finish(&mut self, status: PlanStatus) {
        self.status = status;
        self.completed_at = Some(now_ms());
    }

    /// Consecutive steps at the tail that ended FAILED for the same subtask —
    /// used to decide between a retry cycle and a permanent FAILED mark.
    pub fn consecutive_tail_failures_for(&self, sub_task_id: &str) -> u32 {
        self.steps
            .iter()
            .rev()
            .take_while(|s| s.sub_task_id == sub_task_id && s.status == StepStatus::Failed)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_execution_new() {
        let exec = PlanExecution::new("plan-1");
        assert_eq!(exec.status, PlanStatus::Executing);
        assert!(exec.steps.is_empty());
    }

    #[test]
    fn test_record_step_and_finish() {
        let mut exec = PlanExecution::new("plan-1");
        let mut step = ExecutionStep::new("sub-1", "I should run the tests");
        step.finish(StepStatus::Completed, "tests passed");
        exec.record_step(step);

        assert_eq!(exec.steps.len(), 1);
        assert_eq!(exec.steps[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_consecutive_tail_failures() {
        let mut exec = PlanExecution::new("plan-1");
        for _ in 0..2 {
            let mut step = ExecutionStep::new("sub-1", "retry");
            step.finish(StepStatus::Failed, "boom");
            exec.record_step(step);
        }
        assert_eq!(exec.consecutive_tail_failures_for("sub-1"), 2);

        let mut ok_step = ExecutionStep::new("sub-1", "final attempt");
        ok_step.finish(StepStatus::Completed, "fixed");
        exec.record_step(ok_step);
        assert_eq!(exec.consecutive_tail_failures_for("sub-1"), 0);
    }
}
