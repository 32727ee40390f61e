//! Domain types for the agent core.
//!
//! `Task`/`TaskResult` are the unit the TaskQueue schedules and the
//! TaskExecutor carries out. `ExecutionPlan`/`SubTask`/`PlanExecution` are
//! the Planner's static-plan and runtime-execution records.

mod execution;
mod id;
mod plan;
mod priority;
mod task;

pub use execution::{ActionSpec, ExecutionStep, PlanExecution, StepStatus};
pub use id::{DomainId, IdResolver, generate_id};
pub use plan::{Complexity, ExecutionPlan, OperationMode, PlanStatus, PlanStrategy, SubTask};
pub use priority::Priority;
pub use task::{RetryPolicy, Task, TaskResult, TaskStatus, TaskType};
