//! AI Adapter trait - the seam between the Planner/TaskExecutor and a
//! concrete LLM provider.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// A provider capable of serving completion requests, with or without
/// streaming. `AnthropicClient` is the only implementation the agent ships
/// with; anything else speaking this trait plugs in unchanged.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}
