//! Troupe command line.
//!
//! `troupe validate` parses a plan file and checks its dependency graph;
//! `troupe run` executes one through the full session loop with scripted
//! workers, streaming task output to stdout. Real model backends plug in as
//! `StreamingResponder` implementations; the CLI ships the scripted one for
//! local end-to-end runs.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use troupe_agent::{ResponseCollector, ScriptedResponder};
use troupe_blackboard::FileAuditSink;
use troupe_core::{AgentRole, RunContext, SupervisorPlan, TroupeError, TroupeResult};
use troupe_orchestrator::{RoleDispatcher, RunEvent, TaskGraph};
use troupe_session::SupervisorSession;

#[derive(Parser)]
#[command(name = "troupe", about = "Troupe — supervisor-led multi-agent run orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "troupe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan file end to end with scripted workers
    Run {
        /// Path to the plan JSON file
        #[arg(long)]
        plan: PathBuf,
        /// The user message driving the run
        message: String,
    },
    /// Parse a plan file and validate its dependency graph
    Validate {
        /// Path to the plan JSON file
        #[arg(long)]
        plan: PathBuf,
    },
}

#[derive(Deserialize, Default)]
struct TroupeConfig {
    /// Response collection deadline, in seconds.
    #[serde(default = "default_deadline_secs")]
    collect_deadline_secs: u64,
    /// Directory for the durable blackboard audit log.
    #[serde(default)]
    audit_dir: Option<PathBuf>,
    /// Scripted worker definitions.
    #[serde(default)]
    workers: Vec<WorkerConfig>,
}

#[derive(Deserialize)]
struct WorkerConfig {
    agent_id: String,
    /// Role code, 1–6.
    role: u8,
    reply: String,
}

fn default_deadline_secs() -> u64 {
    30
}

async fn load_config(path: &PathBuf) -> TroupeResult<TroupeConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(TroupeConfig::default());
    }
    let raw = tokio::fs::read_to_string(path).await?;
    toml::from_str(&raw).map_err(|e| TroupeError::Config(e.to_string()))
}

/// Build the worker table from config, or a stock one covering every role
/// under the `<role>-1` naming convention when none is configured.
fn build_dispatcher(config: &TroupeConfig) -> TroupeResult<Arc<RoleDispatcher>> {
    let mut dispatcher = RoleDispatcher::new();
    if config.workers.is_empty() {
        for role in AgentRole::ALL {
            dispatcher.register(
                role,
                format!("{role}-1"),
                Arc::new(ScriptedResponder::replying(format!(
                    "{} output for the requested task.",
                    role.label()
                ))),
            );
        }
    } else {
        for worker in &config.workers {
            let role = AgentRole::from_code(worker.role)?;
            dispatcher.register(
                role,
                worker.agent_id.clone(),
                Arc::new(ScriptedResponder::replying(worker.reply.clone())),
            );
        }
    }
    Ok(Arc::new(dispatcher))
}

async fn validate(plan_path: &PathBuf) -> TroupeResult<()> {
    let text = tokio::fs::read_to_string(plan_path).await?;
    let plan = SupervisorPlan::parse(&text)?;
    plan.validate()?;
    let graph = TaskGraph::from_plan(&plan);
    graph.validate()?;
    println!(
        "plan ok: {} task(s), mode {:?}, proceed={}",
        graph.len(),
        plan.execution_mode,
        plan.should_proceed
    );
    Ok(())
}

async fn run(config: TroupeConfig, plan_path: &PathBuf, message: &str) -> TroupeResult<()> {
    let plan_text = tokio::fs::read_to_string(plan_path).await?;
    let dispatcher = build_dispatcher(&config)?;

    // The plan file stands in for the supervisor's streamed response.
    let supervisor = Arc::new(ScriptedResponder::replying(plan_text));
    let mut session = SupervisorSession::new(supervisor, dispatcher).with_collector(
        ResponseCollector::new(Duration::from_secs(config.collect_deadline_secs)),
    );
    if let Some(dir) = &config.audit_dir {
        let sink = FileAuditSink::new(dir.clone());
        session = session.with_audit_sink(sink.sender());
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                RunEvent::Greeting { text } => println!("{text}"),
                RunEvent::TaskDelta { text, .. } => print!("{text}"),
                RunEvent::TaskStarted { task_id } => println!("[{task_id}] started"),
                RunEvent::TaskCompleted { task_id } => println!("\n[{task_id}] completed"),
                RunEvent::TaskFailed { task_id, error } => {
                    println!("[{task_id}] failed: {error}");
                }
                RunEvent::TaskSkipped { task_id } => println!("[{task_id}] skipped"),
                RunEvent::TaskCancelled { task_id } => println!("[{task_id}] cancelled"),
                RunEvent::RunFinished { status } => println!("run finished: {status:?}"),
            }
        }
    });

    let ctx = RunContext::new("cli");
    let outcome = session.run(&ctx, message, events_tx, cancel).await?;
    let _ = printer.await;

    println!("\n{}", outcome.report.summary);
    for task in &outcome.report.tasks {
        match &task.error {
            Some(error) => println!("  {} [{:?}] {}", task.id, task.status, error),
            None => println!("  {} [{:?}]", task.id, task.status),
        }
    }
    println!("{} blackboard message(s) logged", outcome.log.len());
    Ok(())
}

#[tokio::main]
async fn main() -> TroupeResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Run { plan, message } => run(config, &plan, &message).await,
        Commands::Validate { plan } => validate(&plan).await,
    }
}
