//! `automation-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: validate a workflow JSON file and print its execution order.
//! - `run`: run a workflow file with dry-run side effects.
//! - `node-types`: list the node types with a built-in executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{
    EngineConfig, ExecutorRegistry, RunStatus, ValidatedGraph, WorkflowDefinition, WorkflowExecutor,
};
use nodes::Collaborators;
use store::{InMemoryDefinitions, TracingLogSink};

#[derive(Parser)]
#[command(name = "automation-engine", about = "Workflow automation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow once and print the final run state as JSON.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Trigger payload, as a JSON object.
        #[arg(long, default_value = "{}")]
        input: String,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// List supported node types.
    NodeTypes,
}

#[derive(Args)]
struct EngineArgs {
    /// Maximum node executions in flight per run.
    #[arg(long, env = "AUTOMATION_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,
    /// Attempts per node, first try included.
    #[arg(long, env = "AUTOMATION_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,
    #[arg(long, env = "AUTOMATION_RETRY_BASE_DELAY_MS", default_value_t = 100)]
    retry_base_delay_ms: u64,
    #[arg(long, env = "AUTOMATION_RETRY_MAX_DELAY_MS", default_value_t = 30_000)]
    retry_max_delay_ms: u64,
    #[arg(long, env = "AUTOMATION_NODE_TIMEOUT_MS", default_value_t = 300_000)]
    node_timeout_ms: u64,
    /// Fail the source node when a guard cannot be evaluated.
    #[arg(long, env = "AUTOMATION_STRICT_GUARDS")]
    strict_guards: bool,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_concurrency(self.concurrency)
            .with_max_attempts(self.max_attempts)
            .with_retry_delays(
                Duration::from_millis(self.retry_base_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            )
            .with_node_timeout(Duration::from_millis(self.node_timeout_ms))
            .with_strict_guards(self.strict_guards)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = read_definition(&path)?;
            match ValidatedGraph::load(definition) {
                Ok(graph) => {
                    println!(
                        "Workflow '{}' is valid. Execution order: {:?}",
                        graph.name(),
                        graph.topological_order()
                    );
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path, input, engine } => {
            let definition = read_definition(&path)?;
            let payload: Map<String, Value> =
                serde_json::from_str(&input).context("--input must be a JSON object")?;

            let definitions = Arc::new(InMemoryDefinitions::new());
            let row = definition.to_row()?;
            let workflow_id = row.id;
            definitions.insert(row).await;

            let executor = WorkflowExecutor::new(
                definitions,
                Arc::new(TracingLogSink),
                ExecutorRegistry::with_builtins(&Collaborators::dry_run()),
                engine.config(),
            );

            let view = executor.execute(workflow_id, payload).await?;
            info!(run_id = %view.run_id, status = %view.status, "run settled");
            println!("{}", serde_json::to_string_pretty(&view)?);

            if view.status != RunStatus::Completed {
                std::process::exit(1);
            }
        }
        Command::NodeTypes => {
            let registry = ExecutorRegistry::with_builtins(&Collaborators::dry_run());
            for node_type in registry.node_types() {
                println!("{node_type}");
            }
        }
    }

    Ok(())
}

fn read_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid workflow JSON in {}", path.display()))
}
