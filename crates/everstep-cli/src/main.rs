//! CLI driver for the Everstep durable workflow engine.
//!
//! Runs the employee-onboarding demo workflow against a SQLite-backed
//! store: start a run, crash it mid-flight, resume it (completed steps are
//! skipped), cancel it, or inspect its status.

mod onboarding;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use everstep_engine::{metrics, DurableContext, SqliteStore, Store, WorkflowStatus};

#[derive(Parser)]
#[command(name = "everstep", about = "Durable workflow engine driver")]
struct Cli {
    /// SQLite database path. Falls back to EVERSTEP_DB, then `everstep.db`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the onboarding workflow from the start.
    Run {
        #[arg(long, default_value = "employee-1")]
        workflow_id: String,
        /// Exit the process after this many completed demo steps
        /// (crash simulation; resume with `resume`).
        #[arg(long)]
        crash_after: Option<u32>,
        /// Run the saga variant, with compensations registered per step.
        #[arg(long)]
        saga: bool,
    },
    /// Resume a crashed workflow; memoized steps are skipped.
    Resume {
        #[arg(long, default_value = "employee-1")]
        workflow_id: String,
        #[arg(long)]
        saga: bool,
    },
    /// Durably cancel a workflow; subsequent steps are rejected.
    Cancel {
        #[arg(long)]
        workflow_id: String,
    },
    /// Show workflow status and completed steps.
    Status {
        #[arg(long)]
        workflow_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .or_else(|| std::env::var_os("EVERSTEP_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("everstep.db"));
    let store = Arc::new(SqliteStore::new(&db_path));

    match cli.command {
        Command::Run {
            workflow_id,
            crash_after,
            saga,
        } => {
            let options = onboarding::RunOptions { crash_after, saga };
            execute(&store, &workflow_id, &options)
        }
        Command::Resume { workflow_id, saga } => {
            let completed = store
                .completed_steps(&workflow_id)
                .context("listing completed steps")?;
            println!(
                "resuming workflow {} with {} completed steps",
                workflow_id,
                completed.len()
            );
            for record in &completed {
                println!("  {}", record.step_key);
            }
            metrics::record_restart();

            let options = onboarding::RunOptions {
                crash_after: None,
                saga,
            };
            execute(&store, &workflow_id, &options)
        }
        Command::Cancel { workflow_id } => {
            store
                .cancel_workflow(&workflow_id)
                .context("cancelling workflow")?;
            println!("workflow {workflow_id} cancelled");
            Ok(())
        }
        Command::Status { workflow_id } => {
            let status = store
                .workflow_status(&workflow_id)
                .context("reading workflow status")?;
            match status {
                Some(status) => println!("workflow {}: {}", workflow_id, status.as_str()),
                None => println!("workflow {workflow_id}: not found"),
            }
            for record in store
                .completed_steps(&workflow_id)
                .context("listing completed steps")?
            {
                println!("  {} ({})", record.step_key, record.status.as_str());
            }
            Ok(())
        }
    }
}

fn execute(
    store: &Arc<SqliteStore>,
    workflow_id: &str,
    options: &onboarding::RunOptions,
) -> anyhow::Result<()> {
    store
        .upsert_workflow(workflow_id, WorkflowStatus::Running)
        .context("initializing workflow")?;

    let ctx = DurableContext::new(workflow_id, Arc::clone(store) as Arc<dyn Store>);
    onboarding::run(&ctx, options)?;

    store
        .upsert_workflow(workflow_id, WorkflowStatus::Completed)
        .context("completing workflow")?;

    println!("workflow {workflow_id} completed");
    println!("{}", metrics::snapshot());
    Ok(())
}
