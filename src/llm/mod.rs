//! AI Adapter — the LLM client trait and its Anthropic implementation.
//!
//! Provides LLM completion requests and utilities.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
#[allow(unused_imports)]
pub use types::Role;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, StopReason, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition,
};

use crate::config::LlmConfig;

/// Create the AI Adapter client configured for this agent.
///
/// Only the Anthropic provider ships today; unknown `provider` values are
/// rejected rather than silently falling back.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic",
                other
            )))
        }
    }
}
