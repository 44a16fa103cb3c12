// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Simulated producers for `jobwatch demo`.
//!
//! A log download moves one file per tick and stops as soon as its cancel signal
//! fires. A database export streams a fixed number of bytes per tick and has no
//! cancel signal at all.

use std::sync::Arc;
use std::time::Duration;

use jobwatch::{
    CancelSignal, DatabaseJobMeta, JobId, JobReporter, JobResult, JobTracker, LogJobMeta, TransferCounters,
};
use tokio::task::JoinHandle;

const LOG_FILE_BYTES: u64 = 256 * 1024;
const EXPORT_CHUNK_BYTES: u64 = 1024 * 1024;
const ENVIRONMENTS: [&str; 3] = ["Integration", "Preproduction", "Production"];

#[derive(Debug, Clone)]
pub struct LogPlan {
    pub meta: LogJobMeta,
    pub total_files: u64,
    /// Fail after this many files instead of completing
    pub fail_after: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub meta: DatabaseJobMeta,
    pub chunks: u64,
}

/// Plans for `count` log downloads. The third one fails part way.
pub fn log_plans(project: &str, count: usize) -> Vec<LogPlan> {
    (0..count)
        .map(|i| {
            let env = ENVIRONMENTS[i % ENVIRONMENTS.len()];
            let container = if i % 2 == 0 { "applogs" } else { "insights-logs-appservice" };
            LogPlan {
                meta: LogJobMeta::new(project, env, container)
                    .with_output_dir(format!("./logs/{}/{}", env.to_lowercase(), container)),
                total_files: 6 + 2 * i as u64,
                fail_after: (i == 2).then_some(3),
            }
        })
        .collect()
}

pub fn export_plans(project: &str, count: usize) -> Vec<ExportPlan> {
    (0..count)
        .map(|i| {
            let env = ENVIRONMENTS[(i + 2) % ENVIRONMENTS.len()];
            let database = if i % 2 == 0 { "cms" } else { "analytics" };
            ExportPlan {
                meta: DatabaseJobMeta::new(project, env, database)
                    .with_file_path(format!("./exports/{}-{}.sql.gz", env.to_lowercase(), database)),
                chunks: 8 + 3 * i as u64,
            }
        })
        .collect()
}

/// Register a log job and spawn its producer.
pub fn spawn_log_download(
    tracker: &Arc<JobTracker>,
    plan: LogPlan,
    tick: Duration,
) -> JobResult<(JobId, JoinHandle<()>)> {
    let (reporter, signal) = tracker.start_log_job(plan.meta.clone())?;
    let id = reporter.id().clone();
    let handle = tokio::spawn(async move {
        run_log_download(reporter, signal, plan, tick).await;
    });
    Ok((id, handle))
}

/// Register a database job and spawn its producer.
pub fn spawn_database_export(
    tracker: &Arc<JobTracker>,
    plan: ExportPlan,
    tick: Duration,
) -> JobResult<(JobId, JoinHandle<()>)> {
    let reporter = tracker.start_database_job(plan.meta.clone())?;
    let id = reporter.id().clone();
    let handle = tokio::spawn(async move {
        run_database_export(reporter, plan, tick).await;
    });
    Ok((id, handle))
}

async fn run_log_download(reporter: JobReporter, mut signal: CancelSignal, plan: LogPlan, tick: Duration) {
    let total_bytes = plan.total_files * LOG_FILE_BYTES;
    if reporter.running().is_err() {
        return;
    }

    for done in 1..=plan.total_files {
        tokio::select! {
            _ = signal.cancelled() => {
                tracing::info!(job_id = %reporter.id(), files = done - 1, "Log download stopped on cancel");
                return;
            }
            _ = tokio::time::sleep(tick) => {}
        }

        if plan.fail_after == Some(done) {
            let _ = reporter.fail(format!("blob read timed out after {} files", done));
            return;
        }

        let counters = TransferCounters::files(done, plan.total_files)
            .with_bytes(done * LOG_FILE_BYTES, total_bytes)
            .with_current_file(format!("{}/PT1H-{:02}.json", plan.meta.container, done));
        if reporter.progress(counters).is_err() {
            // Cancelled or otherwise finished under us
            return;
        }
    }

    let _ = reporter.complete();
}

async fn run_database_export(reporter: JobReporter, plan: ExportPlan, tick: Duration) {
    let total_bytes = plan.chunks * EXPORT_CHUNK_BYTES;
    if reporter.running().is_err() {
        return;
    }

    for chunk in 1..=plan.chunks {
        tokio::time::sleep(tick).await;
        let counters = TransferCounters::bytes(chunk * EXPORT_CHUNK_BYTES, total_bytes)
            .with_current_file(plan.meta.database.clone());
        if reporter.progress(counters).is_err() {
            return;
        }
    }

    let _ = reporter.complete_with(TransferCounters::bytes(total_bytes, total_bytes));
}
