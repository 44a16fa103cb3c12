// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poll Loop (Monitor)
//!
//! Client-side wait for one job:
//!
//! ```text
//! NotStarted ──initial delay──▶ Polling ──▶ Finished | TimedOut | NotFound
//!                                  │  ▲
//!                                  └──┘ sleep(poll interval)
//! ```
//!
//! Every cycle re-reads the job from the registry. A terminal job ends the loop
//! with a summary line; an active one yields a progress line from the sampler.
//! Hitting the poll ceiling only ends the *wait*: the job is never cancelled by a
//! monitor timeout. Both sleeps race a caller-supplied stop future, so a client
//! that goes away does not leave a timer behind.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::JobError;
use crate::progress::{format_bytes, format_duration, LiveProgress};
use crate::registry::JobRegistry;
use crate::types::{Job, JobId, JobStatus};

/// Time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before the first poll, to let the job reach steady state.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Poll ceiling (180 x 10s = 30 minutes).
pub const DEFAULT_MAX_POLLS: u32 = 180;

/// Timing parameters for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub max_polls: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl MonitorConfig {
    /// Longest a monitor can wait before giving up.
    pub fn ceiling(&self) -> Duration {
        self.initial_delay + self.poll_interval * self.max_polls.saturating_sub(1)
    }
}

/// How a monitoring session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// The job reached a terminal status
    Finished(Job),
    /// The poll ceiling was hit; carries the last observed (still active) job
    TimedOut(Job),
    /// The job is in neither the active table nor history
    NotFound,
    /// The caller stopped the monitor
    Stopped,
}

/// Everything a monitoring session produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReport {
    pub job_id: JobId,
    pub outcome: MonitorOutcome,
    /// One line per poll, in order
    pub updates: Vec<String>,
    pub polls: u32,
}

impl MonitorReport {
    /// The typed error for outcomes that did not end in a terminal job.
    ///
    /// `Stopped` is a caller decision, not an error.
    pub fn error(&self) -> Option<JobError> {
        match self.outcome {
            MonitorOutcome::TimedOut(_) => Some(JobError::MonitorTimeout {
                id: self.job_id.clone(),
                polls: self.polls,
            }),
            MonitorOutcome::NotFound => Some(JobError::NotFound(self.job_id.clone())),
            MonitorOutcome::Finished(_) | MonitorOutcome::Stopped => None,
        }
    }

    pub fn final_job(&self) -> Option<&Job> {
        match &self.outcome {
            MonitorOutcome::Finished(job) | MonitorOutcome::TimedOut(job) => Some(job),
            MonitorOutcome::NotFound | MonitorOutcome::Stopped => None,
        }
    }
}

/// Polls the registry until a job finishes or the ceiling is reached.
#[derive(Debug, Clone)]
pub struct Monitor {
    registry: Arc<JobRegistry>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(registry: Arc<JobRegistry>, config: MonitorConfig) -> Self {
        Self { registry, config }
    }

    /// Watch `id` until it finishes, the ceiling is hit, or `stop` resolves.
    ///
    /// `on_update` receives each line as it is produced; the same lines are
    /// collected in the returned report.
    pub async fn watch<S, F>(&self, id: &JobId, stop: S, mut on_update: F) -> MonitorReport
    where
        S: Future<Output = ()>,
        F: FnMut(&str),
    {
        tokio::pin!(stop);
        let mut report = MonitorReport {
            job_id: id.clone(),
            outcome: MonitorOutcome::Stopped,
            updates: Vec::new(),
            polls: 0,
        };

        tokio::select! {
            _ = &mut stop => {
                tracing::debug!(job_id = %id, "Monitor stopped before first poll");
                return report;
            }
            _ = tokio::time::sleep(self.config.initial_delay) => {}
        }

        loop {
            report.polls += 1;

            let (job, live) = match self.registry.snapshot(id) {
                Ok(found) => found,
                Err(_) => {
                    tracing::info!(job_id = %id, polls = report.polls, "Monitored job not found");
                    report.outcome = MonitorOutcome::NotFound;
                    return report;
                }
            };

            let Some(live) = live else {
                let line = summary_line(&job);
                on_update(&line);
                report.updates.push(line);
                tracing::info!(job_id = %id, status = %job.status, polls = report.polls, "Monitored job finished");
                report.outcome = MonitorOutcome::Finished(job);
                return report;
            };

            let line = progress_line(report.polls, self.config.max_polls, &job, &live);
            tracing::debug!(job_id = %id, poll = report.polls, "{}", line);
            on_update(&line);
            report.updates.push(line);

            if report.polls >= self.config.max_polls {
                tracing::warn!(
                    job_id = %id,
                    polls = report.polls,
                    "Monitor gave up waiting; job keeps running"
                );
                report.outcome = MonitorOutcome::TimedOut(job);
                return report;
            }

            tokio::select! {
                _ = &mut stop => {
                    tracing::debug!(job_id = %id, polls = report.polls, "Monitor stopped by caller");
                    return report;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Watch without an external stop signal.
    pub async fn watch_until_done<F>(&self, id: &JobId, on_update: F) -> MonitorReport
    where
        F: FnMut(&str),
    {
        self.watch(id, std::future::pending::<()>(), on_update).await
    }
}

/// One progress line, e.g.
/// `[3/180] logs-... in_progress 30% | files 3/10 | 1.2 MB of 4.0 MB | 97.7 KB/s | ETA 15s | app.log`
pub fn progress_line(poll: u32, max_polls: u32, job: &Job, live: &LiveProgress) -> String {
    let mut parts = vec![format!(
        "[{}/{}] {} {} {}%",
        poll, max_polls, job.id, job.status, job.progress_percent
    )];

    if live.total_files > 0 {
        parts.push(format!("files {}/{}", live.files_downloaded, live.total_files));
    }
    if live.total_bytes > 0 {
        parts.push(format!(
            "{} of {}",
            format_bytes(live.bytes_downloaded),
            format_bytes(live.total_bytes)
        ));
    } else if live.bytes_downloaded > 0 {
        parts.push(format_bytes(live.bytes_downloaded));
    }
    if let Some(speed) = live.speed_string() {
        parts.push(speed);
    }
    if let Some(eta) = live.eta_string() {
        parts.push(format!("ETA {}", eta));
    }
    if let Some(file) = &live.current_file {
        parts.push(file.clone());
    }

    parts.join(" | ")
}

/// Final line for a job that reached a terminal status.
pub fn summary_line(job: &Job) -> String {
    let elapsed = format_duration(job.elapsed().num_seconds().max(0) as u64);
    match job.status {
        JobStatus::Completed => format!(
            "{} completed in {} ({})",
            job.id,
            elapsed,
            format_bytes(job.counters.bytes_downloaded)
        ),
        JobStatus::Failed => format!(
            "{} failed after {}: {}",
            job.id,
            elapsed,
            job.error.as_deref().unwrap_or("no reason given")
        ),
        JobStatus::Cancelled => format!(
            "{} cancelled at {}% after {}",
            job.id, job.progress_percent, elapsed
        ),
        _ => format!("{} is {}", job.id, job.status),
    }
}
