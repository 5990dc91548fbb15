//! Command-line interface for the `comply` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::audit::{
    parse_rule_sets, Artifact, AuditScheduler, AuditAgent, InMemoryArtifacts, InMemoryRuleSets,
    RunConfig,
};
use crate::config::Settings;
use crate::evaluator::{Evaluator, JudgeClient, JudgeConfig};
use crate::repository::{
    create_diesel_pool_from_url, DieselComplianceRepository, DieselEvidenceCacheRepository,
    DieselScanRepository, SqlitePool,
};
use crate::repository::migrations::run_migrations;
use crate::workers::{OrchestratorWorker, ReporterWorker, ValidatorWorker};

#[derive(Debug, Parser)]
#[command(name = "comply", about = "Compliance audit pipeline", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the store schema and data directories.
    Init,
    /// Enqueue a scan for processing.
    Enqueue(EnqueueArgs),
    /// Run the orchestrator loop (QUEUED -> PROCESSING fan-out).
    Orchestrator,
    /// Run validator loops (PENDING result resolution).
    Validator(ValidatorArgs),
    /// Run the reporter loop (finalization and report generation).
    Reporter,
    /// Run orchestrator, validators, and reporter in one process.
    All(AllArgs),
    /// One in-process audit run over local rule sets and artifacts.
    Audit(AuditArgs),
}

#[derive(Debug, Args)]
struct EnqueueArgs {
    /// Repository URL to audit.
    #[arg(long)]
    repo_url: String,

    /// Compliance document IDs the scan covers (repeatable).
    #[arg(long = "document", required = true)]
    documents: Vec<String>,
}

#[derive(Debug, Args)]
struct ValidatorArgs {
    /// Number of validator loops to run in this process.
    #[arg(long, default_value = "1")]
    count: usize,
}

#[derive(Debug, Args)]
struct AllArgs {
    /// Number of validator loops to run alongside the other roles.
    #[arg(long, default_value = "2")]
    validators: usize,
}

#[derive(Debug, Args)]
struct AuditArgs {
    /// JSON file containing the rule sets to audit against.
    #[arg(long)]
    rules: PathBuf,

    /// Artifact file paths to audit (repeatable).
    #[arg(long = "artifact", required = true)]
    artifacts: Vec<PathBuf>,

    /// Evaluate relations one at a time instead of concurrently.
    #[arg(long)]
    sequential: bool,

    /// Skip the judgment service and use heuristic scoring only.
    #[arg(long)]
    no_llm: bool,
}

impl Cli {
    pub async fn run(self) -> Result<i32> {
        let settings = Settings::from_env();
        match self.command {
            Command::Init => init(&settings).await,
            Command::Enqueue(args) => enqueue(&settings, args).await,
            Command::Orchestrator => orchestrator(&settings).await,
            Command::Validator(args) => validators(&settings, args.count).await,
            Command::Reporter => reporter(&settings).await,
            Command::All(args) => all(&settings, args.validators).await,
            Command::Audit(args) => audit(&settings, args).await,
        }
    }
}

async fn open_store(settings: &Settings) -> Result<SqlitePool> {
    settings
        .ensure_directories()
        .context("Failed to create data directories")?;
    let pool = create_diesel_pool_from_url(&settings.database_url())
        .context("Failed to open the task store")?;
    run_migrations(pool.clone())
        .await
        .context("Failed to run migrations")?;
    Ok(pool)
}

async fn init(settings: &Settings) -> Result<i32> {
    let _pool = open_store(settings).await?;
    println!("Store initialized at {}", settings.database_url());
    Ok(0)
}

async fn enqueue(settings: &Settings, args: EnqueueArgs) -> Result<i32> {
    let pool = open_store(settings).await?;
    let scans = DieselScanRepository::new(pool);
    let scan = scans
        .create_scan(&args.repo_url, &args.documents)
        .await
        .context("Failed to enqueue scan")?;
    println!("Enqueued scan {} for {}", scan.id, scan.repo_url);
    Ok(0)
}

async fn orchestrator(settings: &Settings) -> Result<i32> {
    let pool = open_store(settings).await?;
    let worker = OrchestratorWorker::new(
        DieselScanRepository::new(pool.clone()),
        DieselComplianceRepository::new(pool),
        settings.scan_poll_interval,
    );
    run_until_interrupt(worker.run_loop()).await;
    Ok(0)
}

fn build_validator(settings: &Settings, pool: SqlitePool, n: usize) -> Result<ValidatorWorker> {
    let worker_id = if n == 0 {
        settings.worker_id.clone()
    } else {
        format!("{}-{}", settings.worker_id, n + 1)
    };
    let evaluator: Arc<dyn Evaluator> = Arc::new(JudgeClient::new(JudgeConfig::from_env())?);
    Ok(ValidatorWorker::new(
        DieselScanRepository::new(pool.clone()),
        DieselComplianceRepository::new(pool),
        evaluator,
        settings.retry_config(),
        worker_id,
        settings.result_lease,
        settings.result_poll_interval,
        settings.max_evidence_chars,
    ))
}

async fn validators(settings: &Settings, count: usize) -> Result<i32> {
    let pool = open_store(settings).await?;
    let mut handles = Vec::new();
    for n in 0..count.max(1) {
        let worker = build_validator(settings, pool.clone(), n)?;
        handles.push(tokio::spawn(worker.run_loop()));
    }
    wait_for_interrupt().await;
    for handle in handles {
        handle.abort();
    }
    Ok(0)
}

async fn reporter(settings: &Settings) -> Result<i32> {
    let pool = open_store(settings).await?;
    let worker = ReporterWorker::new(
        DieselScanRepository::new(pool),
        settings.report_dir.clone(),
        settings.report_poll_interval,
        settings.max_evidence_chars,
    );
    run_until_interrupt(worker.run_loop()).await;
    Ok(0)
}

async fn all(settings: &Settings, validator_count: usize) -> Result<i32> {
    let pool = open_store(settings).await?;

    let mut handles = Vec::new();
    handles.push(tokio::spawn(
        OrchestratorWorker::new(
            DieselScanRepository::new(pool.clone()),
            DieselComplianceRepository::new(pool.clone()),
            settings.scan_poll_interval,
        )
        .run_loop(),
    ));
    for n in 0..validator_count.max(1) {
        let worker = build_validator(settings, pool.clone(), n)?;
        handles.push(tokio::spawn(worker.run_loop()));
    }
    handles.push(tokio::spawn(
        ReporterWorker::new(
            DieselScanRepository::new(pool),
            settings.report_dir.clone(),
            settings.report_poll_interval,
            settings.max_evidence_chars,
        )
        .run_loop(),
    ));

    wait_for_interrupt().await;
    for handle in handles {
        handle.abort();
    }
    Ok(0)
}

async fn audit(settings: &Settings, args: AuditArgs) -> Result<i32> {
    // The evidence cache lives in the same store as the pipeline, so
    // repeated runs over unchanged artifacts skip re-extraction.
    let pool = open_store(settings).await?;
    let cache = DieselEvidenceCacheRepository::new(pool);

    let rules_json = tokio::fs::read_to_string(&args.rules)
        .await
        .with_context(|| format!("Failed to read rules file {}", args.rules.display()))?;
    let rule_sets = parse_rule_sets(&rules_json)
        .with_context(|| format!("Invalid rules file {}", args.rules.display()))?;
    let ruleset_ids: Vec<String> = rule_sets.iter().map(|rs| rs.id.clone()).collect();

    let artifacts: Vec<Artifact> = args
        .artifacts
        .iter()
        .map(|path| Artifact::from_path(path))
        .collect();
    let artifact_ids: Vec<String> = artifacts.iter().map(|a| a.id.clone()).collect();

    let use_llm = !args.no_llm;
    let evaluator: Option<Arc<dyn Evaluator>> = if use_llm {
        let judge = JudgeClient::new(JudgeConfig::from_env())?;
        if judge.is_available().await {
            Some(Arc::new(judge))
        } else {
            warn!("Judgment service unavailable; falling back to heuristic scoring");
            None
        }
    } else {
        None
    };

    let agent = AuditAgent::new(
        Arc::new(InMemoryRuleSets::from_sets(rule_sets)),
        Arc::new(InMemoryArtifacts::from_artifacts(artifacts)),
        evaluator,
        Arc::new(cache),
    )
    .with_max_search_hits(settings.max_search_hits);

    let mut scheduler = AuditScheduler::new(agent, settings.retry_config());
    if args.sequential {
        scheduler = scheduler.sequential();
    }

    let run_config = RunConfig {
        use_llm,
        ..RunConfig::default()
    };
    let result = scheduler.audit(&ruleset_ids, &artifact_ids, run_config).await;

    println!("Audit complete:");
    println!("  Relations:   {} ({} failed)", result.relations.len(), result.failed_relations);
    println!("  Findings:    {}", result.total_findings);
    println!("  Passed:      {}", result.total_passed);
    println!("  Failed:      {}", result.total_failed);
    println!("  Review:      {}", result.total_review);
    for summary in result.summaries.values() {
        println!(
            "  {} -> rate {:.0}%, avg confidence {:.2}",
            summary.relation_id,
            summary.compliance_rate() * 100.0,
            summary.avg_confidence
        );
    }

    if result.is_compliant() {
        println!("Status: COMPLIANT");
        Ok(0)
    } else {
        println!("Status: NOT COMPLIANT");
        Ok(1)
    }
}

async fn run_until_interrupt<F>(work: F)
where
    F: std::future::Future<Output = ()>,
{
    tokio::select! {
        _ = work => {}
        _ = wait_for_interrupt() => {}
    }
}

async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for interrupt: {}", e);
        // Without a signal handler the loops would spin forever with no
        // way to stop; park instead.
        std::future::pending::<()>().await;
    }
    info!("Interrupt received, shutting down");
}
