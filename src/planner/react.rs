//! The ReAct cycle driving one subtask to SUCCEEDED/FAILED/SKIPPED (§4.5).

use std::time::Duration;

use serde_json::Value;

use crate::domain::{ActionSpec, ExecutionStep, Priority, StepStatus, SubTask, Task, TaskType};
use crate::error::AgentError;

use super::parser::parse_action;
use super::Planner;

/// Outcome of driving one subtask through however many ReAct cycles its
/// priority earns it (§4.5 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// Result of one subtask's ReAct cycle, including whether the reflect step
/// (§4.5 step 5) judged the remaining plan invalidated.
pub(super) struct SubtaskRun {
    pub outcome: SubtaskOutcome,
    pub should_replan: bool,
    pub replan_reason: Option<String>,
}

/// Attempts allowed for a subtask's priority (original attempt + retries).
fn max_attempts(priority: Priority) -> u32 {
    match priority {
        Priority::Critical => 1,
        Priority::High => 3,
        Priority::Medium | Priority::Low | Priority::Background => 1,
    }
}

pub(super) async fn run_subtask(planner: &Planner, plan_goal: &str, exec: &mut crate::domain::PlanExecution, subtask: &SubTask) -> SubtaskRun {
    let attempts = max_attempts(subtask.priority);
    let mut last_failure: Option<String> = None;

    for attempt in 1..=attempts {
        let mut step = ExecutionStep::new(subtask.id.as_str(), String::new());

        let reasoning = reason(planner, plan_goal, subtask, exec, last_failure.as_deref()).await;
        step.reasoning = reasoning.clone();

        pre_execution_tool_check(planner, subtask, &reasoning, exec).await;

        let action = match act(planner, subtask, &reasoning).await {
            Ok(action) => action,
            Err(e) => {
                step.finish(StepStatus::Failed, format!("failed to obtain action: {e}"));
                exec.record_step(step);
                last_failure = Some(e.to_string());
                if exec.consecutive_tail_failures_for(&subtask.id) >= 3 {
                    return SubtaskRun { outcome: SubtaskOutcome::Failed, should_replan: false, replan_reason: None };
                }
                continue;
            }
        };

        let params: serde_json::Map<String, Value> = action.parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let task = Task::new(action.action_type, format!("subtask {}", subtask.id), Value::Object(params))
            .with_priority(subtask.priority);

        let result = planner
            .queue
            .submit_and_wait(task, Duration::from_secs(120))
            .await
            .unwrap_or_else(|e| crate::domain::TaskResult::err("submit-failed", e.to_string(), 0, 1));

        step.action = Some(action.clone());
        let observation = observe(&result);
        exec.working_memory.insert(format!("obs:{}", subtask.id), Value::String(observation.clone()));

        let reflection = reflect(planner, subtask, &observation).await;
        let succeeded = result.success && reflection.demonstrates_outcome;

        if succeeded {
            step.finish(StepStatus::Completed, observation);
            exec.record_step(step);
            return SubtaskRun { outcome: SubtaskOutcome::Succeeded, should_replan: false, replan_reason: None };
        }

        step.should_replan = reflection.should_replan;
        step.finish(StepStatus::Failed, observation.clone());
        exec.record_step(step);
        last_failure = Some(observation);

        if reflection.should_replan {
            return SubtaskRun {
                outcome: SubtaskOutcome::Failed,
                should_replan: true,
                replan_reason: reflection.replan_reason,
            };
        }

        if subtask.priority == Priority::Critical {
            return SubtaskRun { outcome: SubtaskOutcome::Failed, should_replan: false, replan_reason: None };
        }
        if exec.consecutive_tail_failures_for(&subtask.id) >= 3 {
            return SubtaskRun { outcome: SubtaskOutcome::Failed, should_replan: false, replan_reason: None };
        }
        if !matches!(subtask.priority, Priority::High) {
            return SubtaskRun { outcome: SubtaskOutcome::Skipped, should_replan: false, replan_reason: None };
        }
        // HIGH: loop again with a revised reasoning prompt (handled by
        // `last_failure` being fed into the next `reason` call).
    }

    let outcome = if subtask.priority == Priority::High { SubtaskOutcome::Failed } else { SubtaskOutcome::Skipped };
    SubtaskRun { outcome, should_replan: false, replan_reason: None }
}

async fn reason(
    planner: &Planner,
    plan_goal: &str,
    subtask: &SubTask,
    exec: &crate::domain::PlanExecution,
    prior_failure: Option<&str>,
) -> String {
    let recent_memory: Vec<String> = exec
        .working_memory
        .iter()
        .rev()
        .take(5)
        .map(|(k, v)| format!("{k}: {}", value_to_text(v)))
        .collect();

    let mut prompt = format!(
        "Goal: {plan_goal}\nCurrent subtask: {}\nExpected outcome: {}\nWorking memory (most recent first):\n{}\n",
        subtask.description,
        subtask.expected_outcome,
        recent_memory.join("\n")
    );
    if let Some(failure) = prior_failure {
        prompt.push_str(&format!("\nThe previous attempt failed: {failure}\nRevise your approach.\n"));
    }
    prompt.push_str("Reason step by step about how to accomplish this subtask, then stop.");

    planner.complete_text("You are the reasoning step of an autonomous agent. Be concise.", &prompt).await
}

async fn pre_execution_tool_check(planner: &Planner, subtask: &SubTask, reasoning: &str, exec: &mut crate::domain::PlanExecution) {
    let mut candidates: Vec<String> = subtask
        .commands
        .iter()
        .filter_map(|c| c.split_whitespace().next().map(str::to_string))
        .collect();
    candidates.extend(extract_tool_mentions(reasoning));
    candidates.sort();
    candidates.dedup();

    for tool in candidates {
        if tool.is_empty() || planner.environment.probe_tool(&tool).await {
            continue;
        }
        let prompt = format!("The tool `{tool}` appears to be missing on this system. Suggest a one-line install command for it.");
        let suggestion = planner
            .complete_text("You help agents recover from missing command-line tools. Be terse.", &prompt)
            .await;
        exec.working_memory.insert(format!("install-suggestion:{tool}"), Value::String(suggestion));
    }
}

fn extract_tool_mentions(reasoning: &str) -> Vec<String> {
    const KNOWN_TOOLS: &[&str] = &["git", "python3", "node", "npm", "cargo", "docker", "make", "pytest"];
    KNOWN_TOOLS
        .iter()
        .filter(|t| reasoning.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

async fn act(planner: &Planner, subtask: &SubTask, reasoning: &str) -> Result<ActionSpec, AgentError> {
    let prompt = format!(
        "Reasoning: {reasoning}\nSubtask: {}\nRespond with exactly one block:\nACTION_TYPE: <one of SHELL_COMMAND, FILE_READ, FILE_WRITE, FILE_COPY, FILE_DELETE, DIRECTORY_SCAN, AI_ANALYSIS, CODE_GENERATION, DECISION_MAKING, TEXT_PROCESSING, TOOL_CALL, SCRIPT_EXECUTION, COMPOSITE, HEALTH_CHECK, LOG_ANALYSIS>\nACTION_DESCRIPTION: <one line>\nPARAMETERS: key=value, key=value\nEXPECTED_OUTCOME: <one line>",
        subtask.description
    );
    let response = planner
        .complete_text("You translate reasoning into a single concrete action for an executor to run.", &prompt)
        .await;

    let parsed = parse_action(&response).ok_or_else(|| AgentError::PlanningError("could not parse an ACTION_ block".into()))?;
    let type_name = parsed
        .action_type
        .ok_or_else(|| AgentError::PlanningError("action block missing ACTION_TYPE".into()))?;
    let action_type: TaskType = serde_json::from_value(Value::String(type_name))
        .map_err(|e| AgentError::PlanningError(format!("unknown ACTION_TYPE: {e}")))?;

    let parameters = parsed.parameters.into_iter().map(|(k, v)| (k, Value::String(v))).collect();

    Ok(ActionSpec {
        action_type,
        action_description: parsed.action_description,
        parameters,
        expected_outcome: parsed.expected_outcome,
    })
}

fn observe(result: &crate::domain::TaskResult) -> String {
    let output_text = result.output.as_str().map(str::to_string).unwrap_or_else(|| result.output.to_string());
    let first_lines: Vec<&str> = output_text.lines().take(10).collect();
    format!(
        "success={} error={:?} output(first 10 lines)=\n{}",
        result.success,
        result.error,
        first_lines.join("\n")
    )
}

/// Result of the reflect step (§4.5 step 5): whether the observation
/// demonstrates the subtask's expected outcome, and — only checked on
/// failure — whether the remaining plan should be reconsidered.
struct ReflectOutcome {
    demonstrates_outcome: bool,
    should_replan: bool,
    replan_reason: Option<String>,
}

async fn reflect(planner: &Planner, subtask: &SubTask, observation: &str) -> ReflectOutcome {
    let prompt = format!(
        "Expected outcome: {}\nObservation:\n{observation}\nDoes the observation demonstrate the expected outcome? Answer with exactly one word: yes or no.",
        subtask.expected_outcome
    );
    let response = planner
        .complete_text("You judge whether an observation satisfies an expected outcome. Answer yes or no only.", &prompt)
        .await;
    let demonstrates_outcome = response.trim().to_lowercase().starts_with('y');

    if demonstrates_outcome {
        return ReflectOutcome { demonstrates_outcome, should_replan: false, replan_reason: None };
    }

    let replan_prompt = format!(
        "Subtask: {}\nExpected outcome: {}\nObservation:\n{observation}\nThis subtask failed. Is the remaining plan now invalidated by this failure and should it be reconsidered? Answer with exactly one word: yes or no.",
        subtask.description, subtask.expected_outcome
    );
    let replan_response = planner
        .complete_text(
            "You judge whether a subtask failure invalidates the rest of an execution plan. Answer yes or no only.",
            &replan_prompt,
        )
        .await;
    let should_replan = replan_response.trim().to_lowercase().starts_with('y');

    ReflectOutcome {
        demonstrates_outcome,
        should_replan,
        replan_reason: should_replan.then(|| format!("subtask '{}' failed: {observation}", subtask.description)),
    }
}

fn value_to_text(v: &Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
}
