//! AI_ANALYSIS / CODE_GENERATION / DECISION_MAKING / TEXT_PROCESSING
//! handlers (§4.3) — build a prompt from declared parameters and route it
//! through the AI Adapter.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::TaskType;
use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmClient, Message};

fn system_prompt_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::AiAnalysis => {
            "You are analyzing the given content. Respond with a clear, factual analysis. \
             Do not wrap your answer in markdown code fences."
        }
        TaskType::CodeGeneration => {
            "You are generating code to satisfy the given request. Respond with only the code, \
             no surrounding commentary, no markdown code fences."
        }
        TaskType::DecisionMaking => {
            "You are making a decision given the context provided. State the decision plainly \
             first, then a one-paragraph justification."
        }
        TaskType::TextProcessing => "You are processing the given text per the instructions. Respond with only the result.",
        _ => unreachable!("ai::execute is only dispatched for AI-typed tasks"),
    }
}

fn prompt_text(params: &Value) -> Option<&str> {
    for key in ["prompt", "content", "question", "text"] {
        if let Some(s) = params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
            return Some(s);
        }
    }
    None
}

pub async fn execute(llm: Option<&Arc<dyn LlmClient>>, task_type: TaskType, params: &Value) -> Result<Value, AgentError> {
    let prompt = prompt_text(params)
        .ok_or_else(|| AgentError::Validation("AI task requires prompt/content/question/text".into()))?;

    let llm = llm.ok_or_else(|| AgentError::InternalError("no AI Adapter configured".into()))?;

    let request = CompletionRequest {
        system_prompt: system_prompt_for(task_type).to_string(),
        messages: vec![Message::user(prompt.to_string())],
        tools: vec![],
        max_tokens: params.get("maxTokens").and_then(Value::as_u64).unwrap_or(4096) as u32,
    };

    let response = llm.complete(request).await?;
    let text = response
        .content
        .ok_or_else(|| AgentError::ProviderRefusal("model returned no text content".into()))?;

    Ok(serde_json::json!({
        "output": text,
        "usage": {
            "inputTokens": response.usage.input_tokens,
            "outputTokens": response.usage.output_tokens,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_without_llm_is_internal_error() {
        let result = execute(None, TaskType::AiAnalysis, &serde_json::json!({"prompt": "hi"})).await;
        assert!(matches!(result, Err(AgentError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_execute_missing_prompt_is_validation() {
        let result = execute(None, TaskType::AiAnalysis, &serde_json::json!({})).await;
        assert!(matches!(result, Err(AgentError::Validation(_))));
    }
}
