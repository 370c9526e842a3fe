//! CLI entry point for the AutoSense pipeline.
//!
//! Reads a JSON array of `{snapshot, vehicle}` events from `--input` (or
//! stdin), runs them through the pipeline, and writes JSON to stdout.
//! Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use autosense_agents::{InMemoryRegistry, InMemoryTransport, ResponsePolicy};
use autosense_audit::FileAuditStore;
use autosense_orchestrator::{AppConfig, Orchestrator, PipelineEvent, RcaScheduler, RunSummary};

#[derive(Parser)]
#[command(name = "autosense")]
#[command(about = "Predictive maintenance pipeline for connected vehicle fleets")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: autosense).
    #[arg(short, long, default_value = "autosense", global = true)]
    config: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline over a batch of events and print run summaries.
    Run {
        /// JSON file of events; stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Run the pipeline, then print the RCA report over the feedback log.
    Rca {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Check the seals of every event in a file-backed audit store.
    VerifyAudit {
        #[arg(long)]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    match cli.command {
        Command::Run { ref input } => {
            let app = AppConfig::load(&cli.config)?;
            let orchestrator = build_orchestrator(&app)?;
            let rca = rca_scheduler(&orchestrator);
            let summaries = run_events(&orchestrator, &rca, &app, input.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Rca { ref input } => {
            let app = AppConfig::load(&cli.config)?;
            let orchestrator = build_orchestrator(&app)?;
            let rca = rca_scheduler(&orchestrator);
            run_events(&orchestrator, &rca, &app, input.as_ref()).await?;
            let report = rca.run_once();
            println!("{}", serde_json::to_string_pretty(report.as_ref())?);
        }
        Command::VerifyAudit { ref dir } => {
            let store = FileAuditStore::new(dir)?;
            let verified = store.verify_all()?;
            tracing::info!(dir = %dir.display(), verified, "Audit trail verified");
            println!("{}", serde_json::json!({ "verified": verified }));
        }
    }

    Ok(())
}

fn build_orchestrator(app: &AppConfig) -> anyhow::Result<Orchestrator> {
    let policy = match app.runtime.auto_response {
        Some(answer) => ResponsePolicy::Respond(answer),
        None => ResponsePolicy::Silent,
    };

    // An unloadable model degrades every run to `ModelUnavailable` rather
    // than aborting the batch.
    let mut builder = Orchestrator::from_config(app.pipeline.clone())?
        .with_registry(Arc::new(InMemoryRegistry::new(app.service_centers.clone())))
        .with_transport(Arc::new(InMemoryTransport::new(policy)));
    if let Some(dir) = &app.runtime.audit_dir {
        builder = builder.with_audit_store(Arc::new(FileAuditStore::new(dir)?));
    }
    Ok(builder.build())
}

fn rca_scheduler(orchestrator: &Orchestrator) -> Arc<RcaScheduler> {
    Arc::new(RcaScheduler::new(
        orchestrator.feedback_log(),
        orchestrator.config_handle(),
    ))
}

async fn run_events(
    orchestrator: &Orchestrator,
    rca: &Arc<RcaScheduler>,
    app: &AppConfig,
    input: Option<&PathBuf>,
) -> anyhow::Result<Vec<RunSummary>> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let events: Vec<PipelineEvent> = serde_json::from_str(&raw)?;
    tracing::info!(events = events.len(), "Pipeline batch started");

    // Fleet RCA refreshes on its own period while the batch runs.
    let periodic = tokio::spawn({
        let rca = Arc::clone(rca);
        async move { rca.run().await }
    });

    let summaries = orchestrator
        .run_batch(events, app.runtime.max_concurrent_runs)
        .await;
    periodic.abort();

    let health = orchestrator.health();
    if health.is_degraded() {
        tracing::error!(
            platform_alert = true,
            model_unavailable = health.model_unavailable_count(),
            "Batch finished with risk assessment unavailable"
        );
    }
    Ok(summaries)
}
