// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job tracker service.
//!
//! [`JobTracker`] wires the registry, sampler, cancellation coordinator, query
//! facade and monitor together and exposes the caller-facing operations
//! (List, Status, CancelOne, CancelAll) plus the producer entry points that
//! create jobs.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::cancel::{cancel_pair, CancelAllReport, CancelSignal, CancellationCoordinator};
use crate::config::TrackerConfig;
use crate::error::{JobError, JobResult};
use crate::monitor::{Monitor, MonitorReport};
use crate::progress::{LiveProgress, ProgressSampler};
use crate::query::{JobQuery, ListPage, ListQuery};
use crate::registry::{JobCounts, JobRegistry};
use crate::reporter::JobReporter;
use crate::types::{DatabaseJobMeta, Job, JobId, JobKind, JobType, LogJobMeta};

/// Attempts at minting an unused id before giving up.
const MAX_MINT_ATTEMPTS: usize = 5;

/// A job plus its live progress while it is still running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveProgress>,
}

#[derive(Debug)]
pub struct JobTracker {
    registry: Arc<JobRegistry>,
    sampler: Arc<ProgressSampler>,
    coordinator: CancellationCoordinator,
    query: JobQuery,
    monitor: Monitor,
    default_list_limit: usize,
}

impl JobTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        let sampler = Arc::new(ProgressSampler::new());
        let registry = Arc::new(JobRegistry::with_sampler(config.history_capacity, Arc::clone(&sampler)));
        Self {
            coordinator: CancellationCoordinator::new(Arc::clone(&registry)),
            query: JobQuery::new(Arc::clone(&registry)),
            monitor: Monitor::new(Arc::clone(&registry), config.monitor_config()),
            default_list_limit: config.default_list_limit,
            registry,
            sampler,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn sampler(&self) -> &Arc<ProgressSampler> {
        &self.sampler
    }

    /// Register a new log bundle download.
    ///
    /// The producer gets a reporter and the signal it must watch for cancellation.
    pub fn start_log_job(&self, meta: LogJobMeta) -> JobResult<(JobReporter, CancelSignal)> {
        let kind = JobKind::Log(meta);
        for _ in 0..MAX_MINT_ATTEMPTS {
            let (handle, signal) = cancel_pair();
            let job = Job::new(JobId::mint(JobType::Logs), kind.clone());
            match self.registry.register(job, Some(handle)) {
                Ok(id) => return Ok((self.reporter(id), signal)),
                Err(JobError::DuplicateId(id)) => {
                    tracing::debug!(job_id = %id, "Minted id already in use, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(self.mint_exhausted(JobType::Logs))
    }

    /// Register a new database export download. These cannot be cancelled, so no
    /// signal is handed out.
    pub fn start_database_job(&self, meta: DatabaseJobMeta) -> JobResult<JobReporter> {
        let kind = JobKind::Database(meta);
        for _ in 0..MAX_MINT_ATTEMPTS {
            let job = Job::new(JobId::mint(JobType::Database), kind.clone());
            match self.registry.register(job, None) {
                Ok(id) => return Ok(self.reporter(id)),
                Err(JobError::DuplicateId(id)) => {
                    tracing::debug!(job_id = %id, "Minted id already in use, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(self.mint_exhausted(JobType::Database))
    }

    fn reporter(&self, id: JobId) -> JobReporter {
        JobReporter::new(id, Arc::clone(&self.registry))
    }

    fn mint_exhausted(&self, job_type: JobType) -> JobError {
        tracing::warn!(job_type = %job_type, attempts = MAX_MINT_ATTEMPTS, "Could not mint a unique job id");
        JobError::InvalidParameter {
            name: "id",
            message: format!("no unused {} id after {} attempts", job_type, MAX_MINT_ATTEMPTS),
        }
    }

    /// List with raw caller parameters. A `None` limit uses the configured default.
    pub fn list(&self, status: &str, job_type: &str, limit: Option<i64>, offset: i64) -> JobResult<ListPage> {
        let limit = limit.unwrap_or_else(|| i64::try_from(self.default_list_limit).unwrap_or(i64::MAX));
        self.query.list_raw(status, job_type, limit, offset)
    }

    pub fn list_query(&self, query: &ListQuery) -> ListPage {
        self.query.list(query)
    }

    /// One job, with a live progress snapshot while it is active.
    pub fn status(&self, id: &JobId) -> JobResult<StatusReport> {
        let (job, live) = self.registry.snapshot(id)?;
        Ok(StatusReport { job, live })
    }

    /// Status with `monitor = true`: poll until the job finishes, the ceiling is
    /// hit, or `stop` resolves.
    pub async fn monitor<S, F>(&self, id: &JobId, stop: S, on_update: F) -> MonitorReport
    where
        S: Future<Output = ()>,
        F: FnMut(&str),
    {
        self.monitor.watch(id, stop, on_update).await
    }

    pub fn cancel(&self, id: &JobId) -> JobResult<Job> {
        self.coordinator.cancel_one(id)
    }

    pub fn cancel_all(&self) -> CancelAllReport {
        self.coordinator.cancel_all()
    }

    pub fn counts(&self) -> JobCounts {
        self.registry.counts()
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}
