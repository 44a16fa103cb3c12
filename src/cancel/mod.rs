// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cancellation Coordinator
//!
//! Applies cancellation requests against the registry. The only kind-specific
//! decision made here is consulting the job type's [`CancelPolicy`]: log bundle
//! downloads can be stopped, database export streams cannot and are rejected
//! with an explicit reason rather than silently ignored.
//!
//! Cancellation is cooperative. A successful cancel means the signal reached the
//! producer and the job is recorded as `cancelled` with its progress and partial
//! output left as they were; the producer is expected to wind down promptly.

pub mod signal;

use std::sync::Arc;

use serde::Serialize;

use crate::error::{JobError, JobResult};
use crate::registry::JobRegistry;
use crate::types::{CancelPolicy, Job, JobId};

pub use signal::{cancel_pair, CancelHandle, CancelSignal};

/// A job that was not cancelled, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelRejection {
    pub id: JobId,
    pub reason: String,
}

/// Outcome of cancelling every active job.
///
/// The three buckets partition the jobs that were active when the call started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancelAllReport {
    pub cancelled: Vec<JobId>,
    /// Jobs whose type is non-cancellable
    pub skipped: Vec<CancelRejection>,
    /// Cancellable jobs whose signal did not take effect
    pub failed: Vec<CancelRejection>,
}

impl CancelAllReport {
    /// Number of jobs accounted for across all buckets.
    pub fn total(&self) -> usize {
        self.cancelled.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Applies cancellation requests, respecting each job type's policy.
#[derive(Debug, Clone)]
pub struct CancellationCoordinator {
    registry: Arc<JobRegistry>,
}

impl CancellationCoordinator {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Cancel one job.
    ///
    /// Database exports are always refused with `NonCancellable`. A log job that
    /// is no longer active is `NotFound`.
    pub fn cancel_one(&self, id: &JobId) -> JobResult<Job> {
        let job = self.registry.get(id)?;
        if let CancelPolicy::Forbidden { reason } = job.job_type().cancel_policy() {
            tracing::info!(job_id = %id, job_type = %job.job_type(), "Refused to cancel job: {}", reason);
            return Err(JobError::NonCancellable {
                id: id.clone(),
                reason: reason.to_string(),
            });
        }

        let job = self.registry.cancel(id)?;
        tracing::info!(job_id = %id, progress = job.progress_percent, "Cancelled job");
        Ok(job)
    }

    /// Cancel every active job, visiting each exactly once.
    pub fn cancel_all(&self) -> CancelAllReport {
        let mut active = self.registry.list(true);
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let mut report = CancelAllReport::default();
        for job in active {
            match job.job_type().cancel_policy() {
                CancelPolicy::Forbidden { reason } => report.skipped.push(CancelRejection {
                    id: job.id,
                    reason: reason.to_string(),
                }),
                CancelPolicy::Allowed => match self.registry.cancel(&job.id) {
                    Ok(_) => report.cancelled.push(job.id),
                    Err(err) => {
                        // Includes jobs that finished between the snapshot and now
                        report.failed.push(CancelRejection {
                            id: job.id,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        tracing::info!(
            cancelled = report.cancelled.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Cancel-all finished"
        );
        report
    }
}
