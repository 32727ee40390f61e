//! agentcore — an autonomous agent core: a priority task queue and worker
//! pool, a typed task executor, a ReAct planner, durable state, and the
//! safety policy and tool/AI adapters they depend on.
//!
//! # Modules
//!
//! - [`domain`] - Task/TaskResult, ExecutionPlan/SubTask/PlanExecution
//! - [`queue`] - TaskQueue: priority scheduling, dependencies, retries
//! - [`executor`] - TaskExecutor: per-TaskType handlers
//! - [`planner`] - Planner: decomposition and ReAct execution
//! - [`environment`] - safety policy, shell resolution, path sandboxing
//! - [`state`] - durable agent state snapshot
//! - [`llm`] - AI Adapter trait and Anthropic implementation
//! - [`tools`] - Tool Adapter: local tool registry
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

#![allow(dead_code)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod environment;
pub mod error;
pub mod executor;
pub mod llm;
pub mod planner;
pub mod queue;
pub mod state;
pub mod tools;

pub use agent::{Agent, AgentConfig};
pub use config::Config;
pub use domain::{
    ActionSpec, Complexity, DomainId, ExecutionPlan, ExecutionStep, PlanExecution, PlanStatus, PlanStrategy, Priority,
    RetryPolicy, StepStatus, SubTask, Task, TaskResult, TaskStatus, TaskType,
};
pub use environment::Environment;
pub use error::{AgentError, ErrorKind};
pub use executor::TaskExecutor;
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use planner::Planner;
pub use queue::{QueueStatistics, TaskQueue, TaskQueueConfig};
pub use state::{AgentStateDoc, StateError, StateManager};
pub use tools::{Tool, ToolContext, ToolError, ToolExecutor, ToolResult};
