//! TOOL_CALL handler (§4.3) — routes to the local Tool Adapter registry.

use serde_json::Value;

use crate::environment::Environment;
use crate::error::AgentError;
use crate::llm::ToolCall;
use crate::tools::{ToolContext, ToolExecutor};

pub async fn execute(tools: &ToolExecutor, environment: &Environment, params: &Value) -> Result<Value, AgentError> {
    let tool_name = params
        .get("toolName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Validation("missing required parameter `toolName`".into()))?;

    if !tools.has_tool(tool_name) {
        return Err(AgentError::Validation(format!("unknown tool: {tool_name}")));
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let ctx = ToolContext::new(environment.allow_root.clone(), "tool_call".to_string());
    let call = ToolCall {
        id: "tool-call".to_string(),
        name: tool_name.to_string(),
        input: arguments,
    };

    let result = tools.execute(&call, &ctx).await;
    if result.is_error {
        return Err(AgentError::UpstreamFailed(result.content));
    }

    Ok(serde_json::json!({
        "output": result.content,
        "toolName": tool_name,
    }))
}
