// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for the job tracker, plus CLI-facing formatting.
//!
//! Every outcome a caller can observe is a typed [`JobError`] variant. None of them
//! is fatal: `NotFound`, `NonCancellable` and `CancellationFailed` are ordinary
//! results, and a failure on one job never blocks operations on another.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Result alias used throughout the crate.
pub type JobResult<T> = Result<T, JobError>;

/// Errors returned by registry, query, cancellation and monitor operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Malformed caller input, rejected before any registry access
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// The id is in neither the active table nor the history buffer
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Registration collided with an existing id
    #[error("job id {0} is already registered")]
    DuplicateId(JobId),

    /// The job's kind forbids cancellation
    #[error("job {id} is non-cancellable: {reason}")]
    NonCancellable { id: JobId, reason: String },

    /// The job may be cancelled but the signal did not reach its producer
    #[error("failed to cancel job {id}: {reason}")]
    CancellationFailed { id: JobId, reason: String },

    /// The job already reached a terminal status
    #[error("job {id} is already {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },

    /// The update is not valid for the job's current state
    #[error("invalid update for job {id}: {reason}")]
    InvalidUpdate { id: JobId, reason: String },

    /// Monitoring gave up; the job itself keeps running
    #[error("stopped monitoring job {id} after {polls} polls; the job is still running")]
    MonitorTimeout { id: JobId, polls: u32 },
}

impl JobError {
    /// Stable snake_case code, suitable for JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            JobError::InvalidParameter { .. } => "invalid_parameter",
            JobError::NotFound(_) => "not_found",
            JobError::DuplicateId(_) => "duplicate_id",
            JobError::NonCancellable { .. } => "non_cancellable",
            JobError::CancellationFailed { .. } => "cancellation_failed",
            JobError::AlreadyTerminal { .. } => "already_terminal",
            JobError::InvalidUpdate { .. } => "invalid_update",
            JobError::MonitorTimeout { .. } => "monitor_timeout",
        }
    }

    /// Suggested next steps shown by the CLI.
    pub fn fixes(&self) -> Vec<String> {
        match self {
            JobError::InvalidParameter { name, .. } => match *name {
                "status" => vec!["Use one of: active, completed, failed, all".to_string()],
                "type" => vec!["Use one of: logs, database, all".to_string()],
                "limit" => vec!["Pass a limit between 0 and 100".to_string()],
                "offset" => vec!["Pass an offset of 0 or more".to_string()],
                _ => Vec::new(),
            },
            JobError::NotFound(_) => vec![
                "List known jobs: jobwatch demo --status all".to_string(),
                "Finished jobs age out of history once it is full".to_string(),
            ],
            JobError::NonCancellable { .. } => vec![
                "Wait for the export to finish, or delete the partial file afterwards".to_string(),
            ],
            JobError::CancellationFailed { .. } => vec![
                "The downloader may already be exiting; check the job status again".to_string(),
            ],
            JobError::MonitorTimeout { id, .. } => {
                vec![format!("Check again later: status {}", id)]
            }
            JobError::DuplicateId(_) | JobError::AlreadyTerminal { .. } | JobError::InvalidUpdate { .. } => {
                Vec::new()
            }
        }
    }
}

/// Format an error the way the CLI prints it: title, then numbered fixes.
///
/// ```
/// use jobwatch::error::{format_error, JobError};
/// use jobwatch::JobId;
///
/// let text = format_error(&JobError::NotFound(JobId::new("logs-1")));
/// assert!(text.starts_with("[✗] job logs-1 not found"));
/// ```
pub fn format_error(err: &JobError) -> String {
    let mut output = format!("[✗] {}\n", err);

    let fixes = err.fixes();
    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}
