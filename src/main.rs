use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, ModeArg};
use reconcilr::batch::{BatchCoordinator, BatchEvent, JobContextProvider, StaticContextProvider};
use reconcilr::config::Config;
use reconcilr::domain::{JobKey, JobOutcome, ReconciliationJob, temporal};
use reconcilr::lookup::{EntitySearchClient, LookupClient, ReconServiceClient};
use reconcilr::resilience::{CircuitGuard, RetryingScheduler};
use reconcilr::scoring::ConstraintScorer;
use reconcilr::store::ReconciliationStore;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reconcilr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("reconcilr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.unwrap_or("info")))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn build_coordinator(
    config: &Config,
    profiles: Option<&PathBuf>,
    store: Arc<ReconciliationStore>,
) -> Result<BatchCoordinator> {
    let primary: Arc<dyn LookupClient> =
        Arc::new(ReconServiceClient::new(config.primary_http()).context("Failed to build lookup client")?);
    let circuit = Arc::new(CircuitGuard::new(config.circuit.clone()));

    let mut scheduler = RetryingScheduler::new(primary, circuit).with_config(config.scheduler());
    if let Some(http) = config.fallback_http() {
        let fallback = EntitySearchClient::new(http).context("Failed to build search client")?;
        scheduler = scheduler.with_fallback(Arc::new(fallback));
    }

    let scorer = ConstraintScorer::new(config.scoring.clone()).context("Invalid scoring configuration")?;

    let context: Arc<dyn JobContextProvider> = match profiles {
        Some(path) => Arc::new(
            StaticContextProvider::from_file(path)
                .context(format!("Failed to load profiles from {}", path.display()))?,
        ),
        None => Arc::new(StaticContextProvider::new()),
    };

    Ok(
        BatchCoordinator::new(Arc::new(scheduler), Arc::new(scorer), store, context)
            .with_config(config.batch.clone()),
    )
}

fn outcome_line(key: &JobKey, outcome: &JobOutcome) -> String {
    let detail = match outcome {
        JobOutcome::AutoAccepted { selection, reason } => {
            let what = match selection.entity_id() {
                Some(id) => id.to_string(),
                None => "date".to_string(),
            };
            format!("{} {} ({})", "accepted".green(), what, reason)
        }
        JobOutcome::MatchesAvailable { candidates, best } => format!(
            "{} {} candidates, best {} at {:.2}",
            "review".yellow(),
            candidates.len(),
            best.id,
            best.score
        ),
        JobOutcome::NoMatches => "no match".dimmed().to_string(),
        JobOutcome::Error { message, retryable } => {
            let tag = if *retryable { "error (retryable)" } else { "error" };
            format!("{} {}", tag.red(), message)
        }
        JobOutcome::Settled { status } => format!("{} {}", "settled".cyan(), status),
    };
    format!("{} {}", key.to_string().bold(), detail)
}

fn read_jobs(path: &Path) -> Result<Vec<ReconciliationJob>> {
    let content = fs::read_to_string(path).context(format!("Failed to read jobs from {}", path.display()))?;
    let jobs: Vec<ReconciliationJob> = serde_json::from_str(&content).context("Failed to parse jobs file")?;
    Ok(jobs)
}

async fn handle_batch_command(
    jobs_path: &Path,
    profiles: Option<&PathBuf>,
    mode: ModeArg,
    output: Option<&PathBuf>,
    config: &Config,
    verbose: bool,
) -> Result<()> {
    let jobs = read_jobs(jobs_path)?;
    info!("Read {} jobs from {}", jobs.len(), jobs_path.display());

    let store = match output {
        Some(path) if path.exists() => {
            println!("{} {}", "Resuming from".cyan(), path.display());
            Arc::new(ReconciliationStore::load_jsonl(path).context("Failed to load cell snapshot")?)
        }
        _ => Arc::new(ReconciliationStore::new()),
    };

    let (tx, mut rx) = mpsc::channel(64);
    let coordinator = build_coordinator(config, profiles, store.clone())?.with_events(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::BucketStarted {
                    property_id, jobs, ..
                } => println!("{} {} ({} jobs)", "Property".cyan(), property_id, jobs),
                BatchEvent::JobCompleted { key, outcome, .. } if verbose || !matches!(outcome, JobOutcome::Settled { .. }) => {
                    println!("  {}", outcome_line(&key, &outcome));
                }
                _ => {}
            }
        }
    });

    let report = coordinator
        .run_batch(jobs, mode.into())
        .await
        .context("Batch failed")?;
    drop(coordinator);
    printer.await.context("Progress printer failed")?;

    let summary = report.summary;
    println!(
        "{} {}: {} auto-accepted, {} for review, {} no match, {} errors, {} already settled",
        "Finished".green(),
        report.batch_id,
        summary.auto_accepted,
        summary.matches_available,
        summary.no_matches,
        summary.errors,
        summary.settled
    );

    if let Some(path) = output {
        store.save_jsonl(path).context("Failed to save cell snapshot")?;
        println!("{} {}", "Saved cells to".cyan(), path.display());
    }
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C, running without interrupt: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn handle_one_command(
    value: &str,
    property: &str,
    profiles: Option<&PathBuf>,
    timeout: Option<u64>,
    config: &Config,
) -> Result<()> {
    let coordinator = build_coordinator(config, profiles, Arc::new(ReconciliationStore::new()))?;
    let job = ReconciliationJob::new("cli", property, 0, value);

    let cancel = async move {
        match timeout {
            Some(secs) => {
                tokio::select! {
                    _ = interrupted() => {}
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                }
            }
            None => interrupted().await,
        }
    };

    let outcome = coordinator
        .reconcile_one_until(&job, cancel)
        .await
        .context(format!("Failed to reconcile {:?}", value))?;

    println!("{}", outcome_line(&job.key(), &outcome));
    if let JobOutcome::MatchesAvailable { candidates, .. } = &outcome {
        for candidate in candidates {
            println!(
                "  {:>6.2}  {}  {}{}",
                candidate.score,
                candidate.id.bold(),
                candidate.label,
                candidate
                    .description
                    .as_deref()
                    .map(|d| format!(" - {}", d.dimmed()))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn handle_parse_date_command(value: &str) -> Result<()> {
    match temporal::parse(value) {
        Some(parsed) => println!("{} {} ({})", "date".green(), parsed.time, parsed.precision),
        None => println!("{} {:?} is not a recognisable date", "no".red(), value),
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Batch {
            jobs,
            profiles,
            mode,
            output,
        } => handle_batch_command(jobs, profiles.as_ref(), *mode, output.as_ref(), config, cli.is_verbose()).await,
        Commands::One {
            value,
            property,
            profiles,
            timeout,
        } => handle_one_command(value, property, profiles.as_ref(), *timeout, config).await,
        Commands::ParseDate { value } => handle_parse_date_command(value),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level unless RUST_LOG overrides it
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
