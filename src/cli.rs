//! CLI command definitions and subcommands — a thin caller of the Agent
//! Service; no agent logic lives here (§6 "CLI surface (boundary, not core)").

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentcore - autonomous agent core CLI
#[derive(Parser)]
#[command(
    name = "agentcore",
    about = "Autonomous agent core: task queue, ReAct planner, sandboxed execution",
    version,
    after_help = "State is written to the path configured under agent.state-path."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start the agent's worker pool and autosave timer, then block until
    /// Ctrl-C.
    Start,

    /// Decompose a goal into a plan and execute it to completion.
    Run {
        /// The goal to accomplish
        goal: String,
    },

    /// Submit a single task directly, bypassing planning.
    Submit {
        /// Task type, e.g. SHELL_COMMAND, FILE_READ, AI_ANALYSIS
        task_type: String,

        /// JSON object of task parameters
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Show queue statistics and durable agent state.
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Decompose a goal into an `ExecutionPlan` without executing it.
    CreatePlan {
        /// The goal to decompose
        goal: String,
    },

    /// Execute a previously created plan by id.
    ExecutePlan {
        /// Plan id returned by `create-plan`
        plan_id: String,
    },

    /// List all known plans.
    ListPlans {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for status/list-plans commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["agentcore"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_start() {
        let cli = Cli::parse_from(["agentcore", "start"]);
        assert!(matches!(cli.command, Some(Command::Start)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["agentcore", "status"]);
        assert!(matches!(cli.command, Some(Command::Status { .. })));
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["agentcore", "run", "fix the failing test"]);
        if let Some(Command::Run { goal }) = cli.command {
            assert_eq!(goal, "fix the failing test");
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_submit_default_params() {
        let cli = Cli::parse_from(["agentcore", "submit", "SHELL_COMMAND"]);
        if let Some(Command::Submit { task_type, params }) = cli.command {
            assert_eq!(task_type, "SHELL_COMMAND");
            assert_eq!(params, "{}");
        } else {
            panic!("Expected Submit command");
        }
    }

    #[test]
    fn test_cli_parse_execute_plan() {
        let cli = Cli::parse_from(["agentcore", "execute-plan", "plan-123"]);
        assert!(matches!(cli.command, Some(Command::ExecutePlan { .. })));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["agentcore", "-c", "/path/to/config.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
