//! agentcore — CLI entry point composing the Agent Service.

use clap::Parser;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use agentcore::agent::{Agent, AgentConfig};
use agentcore::cli::{Cli, Command, OutputFormat};
use agentcore::config::Config;
use agentcore::domain::{Task, TaskType};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("agentcore").join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(provider = %config.ai.provider, model = %config.ai.model, "agentcore starting");

    let agent = Agent::new(AgentConfig::from(&config)).await.context("Failed to compose agent")?;

    match cli.command {
        None | Some(Command::Start) => {
            agent.start().await;
            println!("agent started; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            agent.stop().await.context("Failed to stop agent cleanly")?;
        }
        Some(Command::Run { goal }) => {
            agent.start().await;
            let plan = agent.create_plan(goal, Default::default()).await.context("Failed to create plan")?;
            let execution = agent.execute_plan(&plan.id).await.context("Failed to execute plan")?;
            println!("plan {} finished with status {:?}", plan.id, execution.status);
            agent.stop().await.context("Failed to stop agent cleanly")?;
        }
        Some(Command::Submit { task_type, params }) => {
            agent.start().await;
            let task_type: TaskType = serde_json::from_value(serde_json::Value::String(task_type.clone()))
                .map_err(|_| eyre!("unknown task type: {task_type}"))?;
            let params: serde_json::Value = serde_json::from_str(&params).context("params must be a JSON object")?;
            let task = Task::new(task_type, "cli submit", params);
            let id = agent.submit_task(task).await.context("Failed to submit task")?;
            println!("submitted task {id}");
            agent.stop().await.context("Failed to stop agent cleanly")?;
        }
        Some(Command::Status { format }) => {
            let status = agent.status().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => {
                    println!("mode: {:?}", status.mode);
                    println!(
                        "queue: {} total, {} running, {} completed, {} failed",
                        status.queue.total_tasks, status.queue.running, status.queue.completed, status.queue.failed
                    );
                    println!(
                        "state: {} tasks executed ({} ok, {} failed)",
                        status.state.total_tasks_executed, status.state.successful_tasks, status.state.failed_tasks
                    );
                }
            }
        }
        Some(Command::CreatePlan { goal }) => {
            let plan = agent.create_plan(goal, Default::default()).await.context("Failed to create plan")?;
            println!("created plan {} with {} subtasks", plan.id, plan.sub_tasks.len());
        }
        Some(Command::ExecutePlan { plan_id }) => {
            let execution = agent.execute_plan(&plan_id).await.context("Failed to execute plan")?;
            println!("plan {} finished with status {:?}", plan_id, execution.status);
        }
        Some(Command::ListPlans { format }) => {
            let plans = agent.list_plans().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
                OutputFormat::Text => {
                    for plan in plans {
                        println!("{}  {:?}  {}", plan.id, plan.status, plan.goal);
                    }
                }
            }
        }
    }

    Ok(())
}
