// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job Registry
//!
//! Single authoritative store of job existence and state. A job lives in exactly
//! one of two places:
//!
//! ```text
//!  register ──▶ ┌──────────────┐  first terminal status  ┌────────────────┐
//!               │ active table │ ──────────────────────▶ │ history buffer │ ──▶ evicted
//!               └──────────────┘    (same lock scope)     └────────────────┘
//! ```
//!
//! Both stores sit behind one `RwLock`, so the active→history move is atomic:
//! no reader can observe a job in both places or in neither.
//!
//! The registry also owns the [`ProgressSampler`]. A job's cached sample is
//! dropped under the write lock that retires it, and live snapshots are taken
//! under the read lock, so no sample can outlive its job's active entry.
//! Lock order is registry, then sampler.

pub mod history;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;

use crate::cancel::signal::CancelHandle;
use crate::error::{JobError, JobResult};
use crate::locks::{resilient_read, resilient_write};
use crate::progress::{LiveProgress, ProgressSampler};
use crate::types::{CancelPolicy, Job, JobId, JobStatus, JobUpdate};

pub use history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};

/// Where a job currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Active,
    History,
}

/// Job totals by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug)]
struct ActiveEntry {
    job: Job,
    cancel: Option<CancelHandle>,
}

#[derive(Debug)]
struct RegistryInner {
    active: HashMap<JobId, ActiveEntry>,
    history: HistoryBuffer,
}

impl RegistryInner {
    fn location(&self, id: &JobId) -> Option<Location> {
        if self.active.contains_key(id) {
            Some(Location::Active)
        } else if self.history.contains(id) {
            Some(Location::History)
        } else {
            None
        }
    }

    /// Move a job that just went terminal from the active table into history.
    fn retire(&mut self, id: &JobId) -> Option<Job> {
        let entry = self.active.remove(id)?;
        let job = entry.job;
        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type(),
            status = %job.status,
            progress = job.progress_percent,
            "Job reached terminal status"
        );

        let evicted = self.history.push(job.clone());
        for old in evicted {
            tracing::debug!(job_id = %old, "Evicted job from history");
        }
        Some(job)
    }
}

/// Registry of active and finished jobs.
#[derive(Debug)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
    sampler: Arc<ProgressSampler>,
}

impl JobRegistry {
    /// Create an empty registry keeping up to `history_capacity` finished jobs.
    pub fn new(history_capacity: usize) -> Self {
        Self::with_sampler(history_capacity, Arc::new(ProgressSampler::new()))
    }

    /// Create a registry that clears `sampler` as jobs finish.
    pub fn with_sampler(history_capacity: usize, sampler: Arc<ProgressSampler>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                active: HashMap::new(),
                history: HistoryBuffer::new(history_capacity),
            }),
            sampler,
        }
    }

    pub fn sampler(&self) -> &Arc<ProgressSampler> {
        &self.sampler
    }

    /// Insert a new job into the active table.
    ///
    /// `cancel` is the registry's end of the job's cancellation channel; kinds that
    /// cannot be cancelled pass `None`.
    pub fn register(&self, job: Job, cancel: Option<CancelHandle>) -> JobResult<JobId> {
        if job.is_terminal() || job.end_time.is_some() || job.error.is_some() {
            return Err(JobError::InvalidUpdate {
                id: job.id.clone(),
                reason: format!("cannot register a job in status '{}'", job.status),
            });
        }
        if job.progress_percent > 100 {
            return Err(JobError::InvalidUpdate {
                id: job.id.clone(),
                reason: format!("progress {}% is above 100", job.progress_percent),
            });
        }

        let mut inner = resilient_write(&self.inner);
        if inner.location(&job.id).is_some() {
            return Err(JobError::DuplicateId(job.id));
        }

        let id = job.id.clone();
        tracing::info!(
            job_id = %id,
            job_type = %job.job_type(),
            project = job.kind.project(),
            environment = job.kind.environment(),
            target = job.kind.target(),
            "Registered job"
        );
        inner.active.insert(id.clone(), ActiveEntry { job, cancel });
        Ok(id)
    }

    /// Look a job up, active table first, then history.
    ///
    /// Whether the job is still running is a question for `status`, not for which
    /// table answered.
    pub fn get(&self, id: &JobId) -> JobResult<Job> {
        let inner = resilient_read(&self.inner);
        inner
            .active
            .get(id)
            .map(|entry| entry.job.clone())
            .or_else(|| inner.history.get(id).cloned())
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    pub fn location(&self, id: &JobId) -> Option<Location> {
        resilient_read(&self.inner).location(id)
    }

    /// Look a job up and, while it is active, take a live progress sample.
    ///
    /// The sample is recorded under the registry's read lock, so it can never be
    /// cached for a job that has already been retired.
    pub fn snapshot(&self, id: &JobId) -> JobResult<(Job, Option<LiveProgress>)> {
        let inner = resilient_read(&self.inner);
        if let Some(entry) = inner.active.get(id) {
            let live = self.sampler.sample_now(id, &entry.job.counters);
            return Ok((entry.job.clone(), Some(live)));
        }
        inner
            .history
            .get(id)
            .map(|job| (job.clone(), None))
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// Apply a producer-reported change and return the updated snapshot.
    ///
    /// A terminal status moves the job into history within the same lock scope.
    pub fn update(&self, id: &JobId, update: JobUpdate) -> JobResult<Job> {
        let mut inner = resilient_write(&self.inner);

        let Some(entry) = inner.active.get_mut(id) else {
            return Err(match inner.history.get(id) {
                Some(job) => JobError::AlreadyTerminal {
                    id: id.clone(),
                    status: job.status,
                },
                None => JobError::NotFound(id.clone()),
            });
        };

        entry.job.apply(update, Utc::now())?;
        if !entry.job.is_terminal() {
            tracing::debug!(
                job_id = %id,
                status = %entry.job.status,
                progress = entry.job.progress_percent,
                "Updated job"
            );
            return Ok(entry.job.clone());
        }

        let job = inner.retire(id).ok_or_else(|| JobError::NotFound(id.clone()))?;
        self.sampler.forget(id);
        Ok(job)
    }

    /// Signal a job's producer and mark the job cancelled.
    ///
    /// Only active jobs whose type allows cancellation qualify. When the signal
    /// cannot be delivered the job is left untouched and stays active.
    pub fn cancel(&self, id: &JobId) -> JobResult<Job> {
        let mut inner = resilient_write(&self.inner);

        let Some(entry) = inner.active.get_mut(id) else {
            return Err(JobError::NotFound(id.clone()));
        };

        if let CancelPolicy::Forbidden { reason } = entry.job.job_type().cancel_policy() {
            return Err(JobError::NonCancellable {
                id: id.clone(),
                reason: reason.to_string(),
            });
        }

        let delivered = entry.cancel.as_mut().map_or(false, CancelHandle::signal);
        if !delivered {
            tracing::warn!(job_id = %id, "Cancellation signal was not delivered");
            return Err(JobError::CancellationFailed {
                id: id.clone(),
                reason: "the producer is no longer listening for cancellation".to_string(),
            });
        }

        entry
            .job
            .apply(JobUpdate::new().status(JobStatus::Cancelled), Utc::now())?;
        let job = inner.retire(id).ok_or_else(|| JobError::NotFound(id.clone()))?;
        self.sampler.forget(id);
        Ok(job)
    }

    /// Active jobs only, or active and history combined.
    pub fn list(&self, active_only: bool) -> Vec<Job> {
        let inner = resilient_read(&self.inner);
        let active = inner.active.values().map(|entry| entry.job.clone());
        if active_only {
            active.collect()
        } else {
            active.chain(inner.history.iter().cloned()).collect()
        }
    }

    pub fn counts(&self) -> JobCounts {
        let inner = resilient_read(&self.inner);
        let mut counts = JobCounts {
            active: inner.active.len(),
            ..JobCounts::default()
        };
        for job in inner.history.iter() {
            match job.status {
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
                _ => {}
            }
        }
        counts
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
