//! Crate-wide error taxonomy.
//!
//! `AgentError` is the typed error every component seam (TaskQueue,
//! TaskExecutor, Planner, StateManager, Environment) converges on; the
//! Agent Service and CLI boundary instead work with `eyre::Result` built
//! from `AgentError` via `?` and `eyre::Context`.

use thiserror::Error;

/// The taxonomy a `TaskResult.error` and retry decisions are classified by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    SafetyDenied,
    Timeout,
    ProcessError,
    FileIoError,
    Network,
    RateLimit,
    AuthFailure,
    ProviderRefusal,
    UpstreamFailed,
    ParseError,
    PlanningError,
    InternalError,
}

impl ErrorKind {
    /// Whether a handler returning this kind is worth retrying under the
    /// task's `RetryPolicy`. Validation, safety denial, and auth failures are
    /// never retriable — resubmitting cannot change the outcome.
    pub fn is_retriable(self) -> bool {
        !matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::SafetyDenied
                | ErrorKind::AuthFailure
                | ErrorKind::ProviderRefusal
                | ErrorKind::PlanningError
        )
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("command denied by safety policy: {0}")]
    SafetyDenied(String),

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("process error: {0}")]
    ProcessError(String),

    #[error("file I/O error: {0}")]
    FileIoError(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimit { retry_after_ms: Option<u64> },

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("provider refused the request: {0}")]
    ProviderRefusal(String),

    #[error("upstream dependency failed: {0}")]
    UpstreamFailed(String),

    #[error("failed to parse response: {0}")]
    ParseError(String),

    #[error("planning failed: {0}")]
    PlanningError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::SafetyDenied(_) => ErrorKind::SafetyDenied,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ProcessError(_) => ErrorKind::ProcessError,
            Self::FileIoError(_) => ErrorKind::FileIoError,
            Self::Network(_) => ErrorKind::Network,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
            Self::ProviderRefusal(_) => ErrorKind::ProviderRefusal,
            Self::UpstreamFailed(_) => ErrorKind::UpstreamFailed,
            Self::ParseError(_) => ErrorKind::ParseError,
            Self::PlanningError(_) => ErrorKind::PlanningError,
            Self::InternalError(_) => ErrorKind::InternalError,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::FileIoError(e.to_string())
    }
}

impl From<crate::tools::ToolError> for AgentError {
    fn from(e: crate::tools::ToolError) -> Self {
        use crate::tools::ToolError;
        match e {
            ToolError::SandboxViolation { .. } => Self::SafetyDenied(e.to_string()),
            ToolError::CommandTimeout { timeout_ms } => Self::Timeout { timeout_ms },
            ToolError::Io(io) => Self::FileIoError(io.to_string()),
            ToolError::InvalidArgument(_) | ToolError::PatternNotFound { .. } | ToolError::PatternNotUnique { .. } => {
                Self::Validation(e.to_string())
            }
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl From<crate::state::StateError> for AgentError {
    fn from(e: crate::state::StateError) -> Self {
        use crate::state::StateError;
        match e {
            StateError::NotFound(msg) => Self::Validation(msg),
            StateError::StoreError(msg) => Self::FileIoError(msg),
            StateError::DeserializationError(msg) => Self::ParseError(msg),
        }
    }
}

impl From<crate::llm::LlmError> for AgentError {
    fn from(e: crate::llm::LlmError) -> Self {
        use crate::llm::LlmError;
        match e {
            LlmError::RateLimited { retry_after } => Self::RateLimit {
                retry_after_ms: Some(retry_after.as_millis() as u64),
            },
            LlmError::ApiError { status: 401, message } | LlmError::ApiError { status: 403, message } => {
                Self::AuthFailure(message)
            }
            LlmError::ApiError { status: 400, message } => Self::ProviderRefusal(message),
            LlmError::ApiError { status, message } => Self::UpstreamFailed(format!("{status}: {message}")),
            LlmError::Network(err) => Self::Network(err.to_string()),
            LlmError::InvalidResponse(msg) => Self::ParseError(msg),
            LlmError::Timeout(d) => Self::Timeout {
                timeout_ms: d.as_millis() as u64,
            },
            LlmError::Json(err) => Self::ParseError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retriable() {
        assert!(!AgentError::Validation("bad input".into()).is_retriable());
    }

    #[test]
    fn test_process_error_is_retriable() {
        assert!(AgentError::ProcessError("exit 1".into()).is_retriable());
    }

    #[test]
    fn test_safety_denied_is_not_retriable() {
        assert!(!AgentError::SafetyDenied("rm -rf /".into()).is_retriable());
    }
}
