// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Producer-facing reporting interface.
//!
//! A producer (the process driving a log download or a database export) gets one
//! [`JobReporter`] per job and pushes status and raw counters through it. It never
//! touches the registry or the job record directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{JobError, JobResult};
use crate::registry::JobRegistry;
use crate::types::{Job, JobId, JobStatus, JobUpdate, TransferCounters};

/// Failure reason recorded when a reporter is dropped mid-job.
pub const ORPHANED_JOB_REASON: &str = "producer exited without reporting a final status";

/// Reporting handle for one job.
///
/// Dropping the reporter while its job is still active fails the job, so a
/// crashed or forgotten producer never leaves a job stuck in the active table.
#[derive(Debug)]
pub struct JobReporter {
    id: JobId,
    registry: Arc<JobRegistry>,
    finished: AtomicBool,
}

impl JobReporter {
    pub(crate) fn new(id: JobId, registry: Arc<JobRegistry>) -> Self {
        Self {
            id,
            registry,
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// True once the job is known to be terminal (reported here or cancelled).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// The transfer has started.
    pub fn running(&self) -> JobResult<Job> {
        self.set_status(JobStatus::Running)
    }

    pub fn set_status(&self, status: JobStatus) -> JobResult<Job> {
        self.report(JobUpdate::new().status(status))
    }

    /// Report the latest raw counters. Also moves a `starting`/`pending` job to
    /// `in_progress`.
    pub fn progress(&self, counters: TransferCounters) -> JobResult<Job> {
        self.report(JobUpdate::new().counters(counters))
    }

    /// Final success report.
    pub fn complete(&self) -> JobResult<Job> {
        self.report(JobUpdate::completed())
    }

    /// Final success report with the closing counters.
    pub fn complete_with(&self, counters: TransferCounters) -> JobResult<Job> {
        self.report(JobUpdate::completed().counters(counters))
    }

    /// Final failure report.
    pub fn fail(&self, reason: impl Into<String>) -> JobResult<Job> {
        self.report(JobUpdate::failed(reason))
    }

    /// Send an arbitrary update.
    pub fn report(&self, update: JobUpdate) -> JobResult<Job> {
        let result = self.registry.update(&self.id, update);
        match &result {
            Ok(job) if job.is_terminal() => self.finished.store(true, Ordering::Release),
            Err(JobError::AlreadyTerminal { .. }) | Err(JobError::NotFound(_)) => {
                self.finished.store(true, Ordering::Release)
            }
            _ => {}
        }
        result
    }
}

impl Drop for JobReporter {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }
        if self
            .registry
            .update(&self.id, JobUpdate::failed(ORPHANED_JOB_REASON))
            .is_ok()
        {
            tracing::warn!(job_id = %self.id, "Producer dropped its reporter; job marked failed");
        }
    }
}
