// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;

use jobwatch::{
    format_error, CancelAllReport, JobError, JobId, JobStatus, JobTracker, ListPage, MonitorOutcome,
    StatusReport, TrackerConfig,
};

mod simulate;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Usage error - invalid command line arguments
    pub const USAGE: i32 = 64;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// jobwatch - Track long-running log and database downloads.
#[derive(Parser)]
#[command(name = "jobwatch")]
#[command(version = VERSION)]
#[command(about = "Track long-running log and database downloads")]
#[command(long_about = "jobwatch - Background job tracker\n\n\
    Run a demo:          jobwatch demo\n\
    Watch to the end:    jobwatch demo --monitor\n\
    Cancel everything:   jobwatch demo --cancel-all\n\
    Show config:         jobwatch config")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.jobwatch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose mode: debug logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start simulated downloads and query them
    ///
    /// Examples:
    ///   jobwatch demo --status active
    ///   jobwatch demo --type database --monitor
    ///   jobwatch demo --cancel-all --json
    Demo(DemoArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct DemoArgs {
    /// Number of simulated log bundle downloads
    #[arg(long, default_value_t = 3)]
    log_jobs: usize,

    /// Number of simulated database exports
    #[arg(long, default_value_t = 2)]
    db_jobs: usize,

    /// Project the simulated jobs run against
    #[arg(long, default_value = "acme")]
    project: String,

    /// Status filter: active, completed, failed, all
    #[arg(long, default_value = "all")]
    status: String,

    /// Type filter: logs, database, all
    #[arg(long = "type", default_value = "all")]
    job_type: String,

    /// Page size (0-100, defaults to the configured limit)
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Page offset
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,

    /// Poll every job until it finishes
    #[arg(long)]
    monitor: bool,

    /// Cancel all active jobs after the first listing
    #[arg(long)]
    cancel_all: bool,

    /// Simulated producer tick in milliseconds
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,

    /// Override the monitor poll interval
    #[arg(long)]
    poll_secs: Option<u64>,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    match path {
        Some(path) => TrackerConfig::load_from(path),
        None => TrackerConfig::load(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "[✗]".red(), e);
            std::process::exit(CONFIG);
        }
    };

    match cli.command {
        Commands::Config => show_config(&config, cli.config.as_ref()),
        Commands::Demo(args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            runtime.block_on(run_demo(config, args))
        }
    }
}

fn show_config(config: &TrackerConfig, path: Option<&PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path.clone(),
        None => TrackerConfig::default_path()?,
    };
    let source = if path.exists() { "file" } else { "defaults" };
    println!("{} {} ({})", "Config:".bold(), path.display(), source);
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Exit on a caller error, rendered with fixes.
fn exit_with(err: &JobError) -> ! {
    eprint!("{}", format_error(err).red());
    match err {
        JobError::InvalidParameter { .. } => std::process::exit(USAGE),
        _ => std::process::exit(ERROR),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_demo(mut config: TrackerConfig, args: DemoArgs) -> Result<()> {
    if let Some(secs) = args.poll_secs {
        config.monitor.poll_interval_secs = secs.max(1);
    }
    let tracker = Arc::new(JobTracker::new(&config));
    let tick = Duration::from_millis(args.tick_ms.max(1));

    let mut ids = Vec::new();
    let mut producers = Vec::new();
    for plan in simulate::log_plans(&args.project, args.log_jobs) {
        let (id, handle) = simulate::spawn_log_download(&tracker, plan, tick).unwrap_or_else(|e| exit_with(&e));
        ids.push(id);
        producers.push(handle);
    }
    for plan in simulate::export_plans(&args.project, args.db_jobs) {
        let (id, handle) = simulate::spawn_database_export(&tracker, plan, tick).unwrap_or_else(|e| exit_with(&e));
        ids.push(id);
        producers.push(handle);
    }

    // Let the producers report a few times
    tokio::time::sleep(tick * 3).await;

    let page = tracker
        .list(&args.status, &args.job_type, args.limit, args.offset)
        .unwrap_or_else(|e| exit_with(&e));
    if args.json {
        print_json(&page)?;
    } else {
        print_page(&page, &args.status, &args.job_type);
    }

    if args.cancel_all {
        let report = tracker.cancel_all();
        if args.json {
            print_json(&report)?;
        } else {
            print_cancel_report(&report);
        }
    }

    for id in &ids {
        if args.monitor {
            monitor_job(&tracker, id, args.json).await?;
        } else {
            let report = tracker.status(id).unwrap_or_else(|e| exit_with(&e));
            if args.json {
                print_json(&report)?;
            } else {
                print_status(&report);
            }
        }
    }

    for producer in producers {
        if let Err(e) = producer.await {
            tracing::warn!("Producer task ended abnormally: {}", e);
        }
    }

    let counts = tracker.counts();
    if args.json {
        print_json(&counts)?;
    } else {
        println!();
        println!(
            "{} {} active, {} completed, {} failed, {} cancelled",
            "Totals:".bold(),
            counts.active,
            counts.completed.to_string().green(),
            counts.failed.to_string().red(),
            counts.cancelled.to_string().yellow()
        );
    }
    Ok(())
}

async fn monitor_job(tracker: &JobTracker, id: &JobId, json: bool) -> Result<()> {
    if !json {
        println!();
        println!("{} {}", "Monitoring".cyan().bold(), id);
    }
    let stop = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = tracker
        .monitor(id, stop, |line| {
            if !json {
                println!("  {}", line.dimmed());
            }
        })
        .await;

    if json {
        return print_json(&report.updates);
    }
    match (&report.outcome, report.error()) {
        (MonitorOutcome::Stopped, _) => println!("  {}", "Stopped by user".yellow()),
        (MonitorOutcome::Finished(job), _) => println!("  {} {}", status_tag(job.status), job.id),
        (_, Some(err)) => eprint!("{}", format_error(&err).yellow()),
        (_, None) => {}
    }
    Ok(())
}

fn status_tag(status: JobStatus) -> colored::ColoredString {
    let tag = format!("[{}]", status);
    match status {
        JobStatus::Completed => tag.green(),
        JobStatus::Failed => tag.red(),
        JobStatus::Cancelled => tag.yellow(),
        _ => tag.cyan(),
    }
}

fn print_page(page: &ListPage, status: &str, job_type: &str) {
    println!(
        "{} status={} type={} ({} of {})",
        "Jobs".bold(),
        status,
        job_type,
        page.items.len(),
        page.total_count
    );
    if page.items.is_empty() {
        println!("  {}", "No jobs match".dimmed());
    }
    for job in &page.items {
        println!(
            "  {} {} {:>3}% {} {}/{}",
            status_tag(job.status),
            job.id,
            job.progress_percent,
            job.job_type(),
            job.kind.environment(),
            job.kind.target()
        );
        if let Some(error) = &job.error {
            println!("      {}", error.red());
        }
    }
    if page.has_more {
        println!("  {}", "More results available, raise --offset".dimmed());
    }
}

fn print_status(report: &StatusReport) {
    let job = &report.job;
    print!(
        "{} {} {}%",
        status_tag(job.status),
        job.id,
        job.progress_percent
    );
    if let Some(live) = &report.live {
        if let Some(speed) = live.speed_string() {
            print!(" | {}", speed);
        }
        if let Some(eta) = live.eta_string() {
            print!(" | ETA {}", eta);
        }
    }
    println!();
}

fn print_cancel_report(report: &CancelAllReport) {
    println!();
    println!("{}", "Cancel all".bold());
    for id in &report.cancelled {
        println!("  {} {}", "[cancelled]".yellow(), id);
    }
    for rejection in &report.skipped {
        println!("  {} {}: {}", "[skipped]".dimmed(), rejection.id, rejection.reason);
    }
    for rejection in &report.failed {
        println!("  {} {}: {}", "[failed]".red(), rejection.id, rejection.reason);
    }
    if report.is_empty() {
        println!("  {}", "No active jobs".dimmed());
    }
}
