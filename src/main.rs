use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use genloop::config::{self, ConfigSource};
use genloop::domain::Category;
use genloop::driver::{LogSubmitter, LoopDriver};
use genloop::selection::SelectionEngine;
use genloop::snapshot::{Snapshot, SnapshotCell};
use genloop::usage::{JsonlUsageStore, UsageCounter};
use genloop::watcher::{PollWatcher, WatchTargets};

fn setup_logging(log_stderr: bool) -> Result<()> {
    if log_stderr {
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Stderr)
            .init();
        info!("Logging initialized, writing to stderr");
        return Ok(());
    }

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("genloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_run_command(cli, false, None).await,
        Some(Commands::Run { test, seed }) => handle_run_command(cli, *test, *seed).await,
        Some(Commands::Scan) => handle_scan_command(cli),
        Some(Commands::Usage { category, limit }) => handle_usage_command(cli, *category, *limit),
    }
}

async fn handle_run_command(cli: &Cli, test: bool, seed: Option<u64>) -> Result<()> {
    let mut source = ConfigSource::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if test {
        source = source.force_test();
    }
    let config = source.current().clone();
    let seed = seed.or(config.seed);
    if let Some(seed) = seed {
        info!("Using seed {}", seed);
    }

    let snapshots = Arc::new(SnapshotCell::new(Snapshot::build(&config)));
    let usage_dir = config.usage_dir();
    let usage = JsonlUsageStore::open(&usage_dir)
        .with_context(|| format!("Failed to open usage store at {}", usage_dir.display()))?;

    let (tx, rx) = mpsc::channel();
    let targets = WatchTargets::from_config(&config, source.path());
    let watcher = PollWatcher::start(targets, Duration::from_millis(config.watch_interval_ms), tx);

    let stop = Arc::new(AtomicBool::new(false));
    let mut driver = LoopDriver::new(source, snapshots, SelectionEngine::new(seed), usage, LogSubmitter)
        .with_reloads(rx, Some(watcher))
        .with_stop_flag(Arc::clone(&stop));

    if test {
        println!("{} one batch (test mode)", "Running:".green());
    } else {
        println!("{} until interrupted (Ctrl+C)", "Running:".green());
    }

    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping driver");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let summary = tokio::task::spawn_blocking(move || driver.run())
        .await
        .context("Driver task panicked")?
        .context("Driver failed")?;

    println!(
        "{} {} batches, {} submissions, {} aborted, {} reloads",
        "Done:".green(),
        summary.batches,
        summary.submissions,
        summary.aborted,
        summary.reloads
    );
    Ok(())
}

fn handle_scan_command(cli: &Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("Scanning assets");
    let snapshot = Snapshot::build(&config);

    let types = snapshot.catalog.types();
    if types.is_empty() {
        println!("{}", "No assets found".yellow());
        return Ok(());
    }

    for type_key in types {
        let checkpoints = snapshot.catalog.checkpoint_ids(type_key).len();
        println!("{} {}", "Type:".cyan(), type_key.bold());
        println!("  checkpoints: {}", checkpoints);
        for (bucket, count) in snapshot.catalog.lora_buckets(type_key) {
            println!("  lora/{}: {}", bucket, count);
        }
        match snapshot.metadata.summary(type_key) {
            Some((ckpt, lora, named)) => println!(
                "  metadata: {} checkpoint entries, {} lora entries, {} documents",
                ckpt, lora, named
            ),
            None => println!("  metadata: {}", "none".yellow()),
        }
    }
    Ok(())
}

fn handle_usage_command(cli: &Cli, category: Category, limit: usize) -> Result<()> {
    let config = config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let usage_dir = config.usage_dir();
    let store = JsonlUsageStore::open(&usage_dir)
        .with_context(|| format!("Failed to open usage store at {}", usage_dir.display()))?;

    let ranked = store.ranked(category);
    if ranked.is_empty() {
        println!("{} no usage recorded for {}", "Empty:".yellow(), category);
        return Ok(());
    }

    println!("{} {} ({} ids)", "Usage:".cyan(), category, ranked.len());
    for (rank, record) in ranked.iter().take(limit).enumerate() {
        println!(
            "{:>4}. {:<40} {:>6}  {}",
            rank + 1,
            record.id,
            record.count.to_string().green(),
            record.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging before anything else logs
    setup_logging(cli.log_stderr).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli).await.context("Application failed")?;

    Ok(())
}
