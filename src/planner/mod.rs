//! Planner — turns a goal into an `ExecutionPlan` and drives it through
//! ReAct cycles (§4.5). Composed by the Agent Service alongside the
//! TaskQueue, Environment, and AI Adapter it depends on.

mod parser;
mod react;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{ExecutionPlan, PlanExecution, PlanStatus, SubTask};
use crate::environment::Environment;
use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::queue::TaskQueue;

use react::SubtaskOutcome;

const MAX_REPLANS_PER_INDEX: u32 = 3;

const MAX_DECOMPOSITION_ATTEMPTS: u32 = 3;
const PROBE_DEPTH: usize = 3;

pub struct Planner {
    environment: Arc<Environment>,
    llm: Arc<dyn LlmClient>,
    queue: Arc<TaskQueue>,
    plans: Mutex<HashMap<String, ExecutionPlan>>,
    executions: Mutex<HashMap<String, PlanExecution>>,
}

impl Planner {
    pub fn new(environment: Arc<Environment>, llm: Arc<dyn LlmClient>, queue: Arc<TaskQueue>) -> Self {
        Self {
            environment,
            llm,
            queue,
            plans: Mutex::new(HashMap::new()),
            executions: Mutex::new(HashMap::new()),
        }
    }

    async fn complete_text(&self, system_prompt: &str, user_prompt: &str) -> String {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            messages: vec![Message::user(user_prompt.to_string())],
            tools: vec![],
            max_tokens: 2048,
        };
        match self.llm.complete(request).await {
            Ok(response) => response.content.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "AI Adapter call failed during planning");
                String::new()
            }
        }
    }

    /// §4.5 `createPlan`.
    pub async fn create_plan(&self, goal: impl Into<String>, context: HashMap<String, Value>) -> Result<ExecutionPlan, AgentError> {
        let goal = goal.into();
        let probe_summary = self.probe_environment().await;

        let mut sub_tasks: Vec<SubTask> = Vec::new();
        for attempt in 1..=MAX_DECOMPOSITION_ATTEMPTS {
            let response = self.complete_text(DECOMPOSITION_SYSTEM_PROMPT, &decomposition_prompt(&goal, &probe_summary)).await;
            sub_tasks = parser::parse_subtasks(&response);
            if !sub_tasks.is_empty() {
                break;
            }
            warn!(attempt, "decomposition produced zero subtasks, re-prompting");
        }
        if sub_tasks.is_empty() {
            return Err(AgentError::PlanningError("decomposition produced zero subtasks after retries".into()));
        }

        for subtask in &mut sub_tasks {
            self.load_file_context(subtask).await;
        }

        let mut plan = ExecutionPlan::new(goal, sub_tasks);
        plan.context = context;
        plan.set_status(PlanStatus::Created);

        self.plans.lock().await.insert(plan.id.clone(), plan.clone());
        info!(plan_id = %plan.id, subtasks = plan.sub_tasks.len(), "plan created");
        Ok(plan)
    }

    async fn load_file_context(&self, subtask: &mut SubTask) {
        let Some(path) = subtask.file_path.clone() else { return };
        let resolved = self.environment.allow_root.join(&path);
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => {
                subtask.file_exists = true;
                subtask.original_file_content = Some(content);
            }
            Err(_) => {
                subtask.file_exists = false;
            }
        }
    }

    /// §4.5 step 7 `replanFromStep`: a decomposition call restricted to the
    /// remaining goal, substituting the unfinished tail (`from_id` onward)
    /// with a fresh set of subtasks. Already-completed subtasks are left
    /// untouched. Returns the new working order, or an error if the
    /// replanning decomposition itself produces nothing usable.
    async fn replan_from_step(&self, plan: &mut ExecutionPlan, from_id: &str, reason: &str) -> Result<Vec<String>, AgentError> {
        let order = plan.ordered_subtask_ids();
        let from_pos = order.iter().position(|id| id == from_id).unwrap_or(0);
        let remaining_ids: std::collections::HashSet<String> = order[from_pos..].iter().cloned().collect();

        let remaining_descriptions: Vec<String> = plan
            .sub_tasks
            .iter()
            .filter(|s| remaining_ids.contains(&s.id))
            .map(|s| format!("- {} (expected: {})", s.description, s.expected_outcome))
            .collect();

        let remaining_goal = format!(
            "{}\n\nThe plan so far failed partway through: {reason}\n\nThe remaining work still to accomplish:\n{}",
            plan.goal,
            remaining_descriptions.join("\n")
        );

        let probe_summary = self.probe_environment().await;
        let mut new_tail: Vec<SubTask> = Vec::new();
        for attempt in 1..=MAX_DECOMPOSITION_ATTEMPTS {
            let response = self
                .complete_text(DECOMPOSITION_SYSTEM_PROMPT, &decomposition_prompt(&remaining_goal, &probe_summary))
                .await;
            new_tail = parser::parse_subtasks(&response);
            if !new_tail.is_empty() {
                break;
            }
            warn!(attempt, "replan decomposition produced zero subtasks, re-prompting");
        }
        if new_tail.is_empty() {
            return Err(AgentError::PlanningError("replan produced zero subtasks after retries".into()));
        }
        for subtask in &mut new_tail {
            self.load_file_context(subtask).await;
        }

        plan.sub_tasks.retain(|s| !remaining_ids.contains(&s.id));
        let new_ids: Vec<String> = new_tail.iter().map(|s| s.id.clone()).collect();
        plan.sub_tasks.extend(new_tail);

        info!(plan_id = %plan.id, from = %from_id, new_subtasks = new_ids.len(), "replanned remaining tail");

        let mut new_order = order[..from_pos].to_vec();
        new_order.extend(new_ids);
        Ok(new_order)
    }

    /// §4.5 environment probe: depth-`PROBE_DEPTH` directory scan plus
    /// tool-availability probes, compacted into a textual summary.
    async fn probe_environment(&self) -> String {
        let mut manifests = Vec::new();
        scan_for_manifests(&self.environment.allow_root, PROBE_DEPTH, &mut manifests).await;

        const CANDIDATE_TOOLS: &[&str] = &["git", "python3", "node", "npm", "cargo", "docker", "make"];
        let mut available = Vec::new();
        for tool in CANDIDATE_TOOLS {
            if self.environment.probe_tool(tool).await {
                available.push(*tool);
            }
        }

        format!(
            "Project manifests found: {}\nAvailable tools: {}",
            if manifests.is_empty() { "none".to_string() } else { manifests.join(", ") },
            if available.is_empty() { "none".to_string() } else { available.join(", ") }
        )
    }

    /// §4.5 `executePlan`.
    pub async fn execute_plan(&self, plan_id: &str) -> Result<PlanExecution, AgentError> {
        let mut plan = self
            .plans
            .lock()
            .await
            .get(plan_id)
            .cloned()
            .ok_or_else(|| AgentError::Validation(format!("no plan with id {plan_id}")))?;
        plan.set_status(PlanStatus::Executing);
        self.plans.lock().await.insert(plan.id.clone(), plan.clone());

        let mut exec = PlanExecution::new(plan.id.clone());
        let mut consecutive_no_progress = 0u32;
        let mut forced_failure = false;
        let mut outcomes: HashMap<String, SubtaskOutcome> = HashMap::new();

        let mut order = plan.ordered_subtask_ids();
        let mut replans_at_index: HashMap<usize, u32> = HashMap::new();
        let mut idx = 0usize;

        while idx < order.len() {
            let subtask_id = order[idx].clone();
            let Some(subtask) = plan.subtask(&subtask_id).cloned() else {
                idx += 1;
                continue;
            };
            let run = react::run_subtask(self, &plan.goal, &mut exec, &subtask).await;

            if run.should_replan {
                let count = replans_at_index.entry(idx).or_insert(0);
                *count += 1;
                if *count <= MAX_REPLANS_PER_INDEX {
                    let reason = run.replan_reason.clone().unwrap_or_else(|| "remaining plan invalidated".to_string());
                    match self.replan_from_step(&mut plan, &subtask_id, &reason).await {
                        Ok(new_order) => {
                            order = new_order;
                            self.plans.lock().await.insert(plan.id.clone(), plan.clone());
                            continue;
                        }
                        Err(e) => {
                            warn!(plan_id = %plan.id, error = %e, "replan failed, keeping original failure outcome");
                        }
                    }
                } else {
                    warn!(plan_id = %plan.id, index = idx, "replan cutoff reached at this index, proceeding without replanning");
                }
            }

            outcomes.insert(subtask_id, run.outcome);

            match run.outcome {
                SubtaskOutcome::Succeeded => consecutive_no_progress = 0,
                SubtaskOutcome::Skipped => consecutive_no_progress = 0,
                SubtaskOutcome::Failed => {
                    consecutive_no_progress += 1;
                    if subtask.priority == crate::domain::Priority::Critical || consecutive_no_progress >= 3 {
                        forced_failure = true;
                        break;
                    }
                }
            }
            idx += 1;
        }

        let all_resolved = plan
            .sub_tasks
            .iter()
            .all(|s| matches!(outcomes.get(&s.id), Some(SubtaskOutcome::Succeeded) | Some(SubtaskOutcome::Skipped)));

        let final_status = if forced_failure {
            PlanStatus::Failed
        } else if all_resolved {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        exec.finish(final_status);

        plan.set_status(final_status);
        self.plans.lock().await.insert(plan.id.clone(), plan.clone());
        self.executions.lock().await.insert(plan.id.clone(), exec.clone());

        info!(plan_id = %plan.id, status = ?final_status, "plan execution finished");
        Ok(exec)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<ExecutionPlan> {
        self.plans.lock().await.get(plan_id).cloned()
    }

    pub async fn list_plans(&self) -> Vec<ExecutionPlan> {
        self.plans.lock().await.values().cloned().collect()
    }

    pub async fn get_execution(&self, plan_id: &str) -> Option<PlanExecution> {
        self.executions.lock().await.get(plan_id).cloned()
    }
}

fn scan_for_manifests<'a>(
    dir: &'a std::path::Path,
    depth: usize,
    found: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    const MANIFESTS: &[&str] = &[
        "Cargo.toml",
        "package.json",
        "pyproject.toml",
        "requirements.txt",
        "go.mod",
        "pom.xml",
        "build.gradle",
        "Gemfile",
        ".git",
    ];
    Box::pin(async move {
        if depth == 0 {
            return;
        }
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else { return };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if MANIFESTS.contains(&name.as_str()) {
                found.push(name);
                continue;
            }
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_dir() && depth > 1 {
                    scan_for_manifests(&entry.path(), depth - 1, found).await;
                }
            }
        }
    })
}

const DECOMPOSITION_SYSTEM_PROMPT: &str = "You are the planning component of an autonomous agent. Decompose the \
given goal into an ordered list of subtasks. Respond with one SUBTASK_<n> block per subtask, each containing \
Description, Expected Outcome, Priority (CRITICAL/HIGH/MEDIUM/LOW), Complexity (SIMPLE/MODERATE/COMPLEX), \
Dependencies (comma-separated subtask descriptions or blank), and optionally Commands, Code Language, Code Content, \
File Path, File Content.";

fn decomposition_prompt(goal: &str, probe_summary: &str) -> String {
    format!("Goal: {goal}\n\nEnvironment:\n{probe_summary}\n\nProduce the SUBTASK_ blocks now.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    use crate::executor::TaskExecutor;
    use crate::llm::{CompletionResponse, LlmError, StopReason, StreamChunk};
    use crate::queue::{TaskQueue, TaskQueueConfig};

    #[test]
    fn test_decomposition_prompt_includes_goal_and_probe() {
        let prompt = decomposition_prompt("add oauth", "manifests: Cargo.toml");
        assert!(prompt.contains("add oauth"));
        assert!(prompt.contains("Cargo.toml"));
    }

    /// Returns canned completions in order, repeating the last once exhausted.
    struct ScriptedLlm {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let mut queue = self.responses.lock().await;
            let content = queue.pop_front().unwrap_or_default();
            Ok(CompletionResponse {
                content: Some(content),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: Default::default(),
            })
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            _chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            self.complete(request).await
        }
    }

    #[tokio::test]
    async fn test_execute_plan_replans_unfinished_tail_after_invalidating_failure() {
        let temp = tempfile::tempdir().unwrap();
        let environment = Arc::new(Environment::new(temp.path().to_path_buf()));
        let queue = TaskQueue::new(TaskQueueConfig::default(), Arc::new(TaskExecutor::for_tests()), None);
        queue.start_processing();

        let llm = Arc::new(ScriptedLlm::new(vec![
            // create_plan decomposition
            "SUBTASK_1\nDescription: run a doomed command\nExpected Outcome: it exits cleanly\nPriority: LOW\n",
            // reason() for subtask 1
            "I will run the failing command.",
            // act() for subtask 1
            "ACTION_TYPE: SHELL_COMMAND\nACTION_DESCRIPTION: run false\nPARAMETERS: command=false\nEXPECTED_OUTCOME: exits cleanly",
            // reflect(): demonstrates_outcome? -> no
            "no",
            // reflect(): should_replan? -> yes
            "yes",
            // replan_from_step decomposition
            "SUBTASK_1\nDescription: run a working command\nExpected Outcome: it exits cleanly\nPriority: LOW\n",
            // reason() for the replanned subtask
            "I will run the working command instead.",
            // act() for the replanned subtask
            "ACTION_TYPE: SHELL_COMMAND\nACTION_DESCRIPTION: run true\nPARAMETERS: command=true\nEXPECTED_OUTCOME: exits cleanly",
            // reflect(): demonstrates_outcome? -> yes
            "yes",
        ])) as Arc<dyn LlmClient>;

        let planner = Planner::new(environment, llm, queue.clone());
        let plan = planner.create_plan("ship something", HashMap::new()).await.unwrap();
        assert_eq!(plan.sub_tasks.len(), 1);
        let original_subtask_id = plan.sub_tasks[0].id.clone();

        let exec = planner.execute_plan(&plan.id).await.unwrap();
        assert_eq!(exec.status, PlanStatus::Completed);

        let final_plan = planner.get_plan(&plan.id).await.unwrap();
        assert_eq!(final_plan.sub_tasks.len(), 1);
        assert_ne!(final_plan.sub_tasks[0].id, original_subtask_id, "replanning should have replaced the failed subtask");

        assert!(
            exec.steps.iter().any(|s| s.should_replan),
            "at least one recorded step should be flagged should_replan"
        );

        queue.stop_processing(Duration::from_millis(200)).await;
    }
}
