// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Job record types shared by the registry, sampler, coordinator and query facade.
//!
//! A [`Job`] is one tracked download attempt. Its [`JobKind`] is a tagged union over
//! the two producers (log bundle downloads and database exports), each carrying its
//! own structured metadata. Raw transfer counters reported by the producer live in
//! [`TransferCounters`]; derived values (speed, ETA) are computed on demand by the
//! progress sampler and never stored here.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Characters used for the random suffix of minted ids (no 0/O/1/I lookalikes).
const ID_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random suffix of minted ids.
const ID_SUFFIX_LEN: usize = 6;

/// Reason reported when a database export is asked to cancel.
pub const DATABASE_CANCEL_REJECTION: &str = "streams cannot be interrupted";

// =============================================================================
// JOB ID
// =============================================================================

/// Opaque job identifier, unique across both job producers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id for a job of the given type.
    ///
    /// Format: `<prefix>-<yyyymmddHHMMSS>-<XXXXXX>` (e.g. `logs-20250114093012-A3F8K2`).
    /// The prefix keeps log and database ids disjoint even though the two producers
    /// mint independently.
    pub fn mint(job_type: JobType) -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let mut rng = rand::thread_rng();
        let chars: Vec<char> = ID_ALPHABET.chars().collect();
        let random: String = (0..ID_SUFFIX_LEN)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect();
        Self(format!("{}-{}-{}", job_type.id_prefix(), stamp, random))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status of a job.
///
/// `Starting`, `Running`, `Pending` and `InProgress` are active; the rest are
/// terminal and admit no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns true once no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Returns true while the job is still expected to make progress.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// The list-filter bucket this status falls into.
    pub fn bucket(&self) -> StatusBucket {
        match self {
            JobStatus::Starting | JobStatus::Running | JobStatus::Pending | JobStatus::InProgress => {
                StatusBucket::Active
            }
            JobStatus::Completed => StatusBucket::Completed,
            JobStatus::Failed | JobStatus::Cancelled => StatusBucket::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Starting => "starting",
            JobStatus::Running => "running",
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    /// Parse a producer-reported status. Producers are not consistent about
    /// spelling, so `complete`, `error` and dashed/cased variants are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "starting" => Ok(JobStatus::Starting),
            "running" => Ok(JobStatus::Running),
            "pending" => Ok(JobStatus::Pending),
            "in_progress" | "inprogress" => Ok(JobStatus::InProgress),
            "completed" | "complete" => Ok(JobStatus::Completed),
            "failed" | "error" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            _ => Err(JobError::InvalidParameter {
                name: "status",
                message: format!("unknown job status '{}'", s),
            }),
        }
    }
}

/// Coarse grouping used by list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBucket {
    Active,
    Completed,
    Failed,
}

// =============================================================================
// KIND
// =============================================================================

/// The producer population a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Logs,
    Database,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Logs => "logs",
            JobType::Database => "database",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            JobType::Logs => "logs",
            JobType::Database => "db",
        }
    }

    /// Whether jobs of this type may be cancelled at all.
    pub fn cancel_policy(&self) -> CancelPolicy {
        match self {
            JobType::Logs => CancelPolicy::Allowed,
            JobType::Database => CancelPolicy::Forbidden {
                reason: DATABASE_CANCEL_REJECTION,
            },
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type cancellability rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    Allowed,
    Forbidden { reason: &'static str },
}

/// Metadata for an environment log bundle download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogJobMeta {
    pub project: String,
    pub environment: String,
    /// Storage container the logs are pulled from (e.g. `insights-logs-appserviceconsolelogs`)
    pub container: String,
    /// Local directory the bundle is written into
    pub output_dir: Option<PathBuf>,
}

impl LogJobMeta {
    pub fn new(project: impl Into<String>, environment: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            container: container.into(),
            output_dir: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Metadata for a database export download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseJobMeta {
    pub project: String,
    pub environment: String,
    pub database: String,
    /// Destination of the exported blob
    pub file_path: Option<PathBuf>,
}

impl DatabaseJobMeta {
    pub fn new(project: impl Into<String>, environment: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            database: database.into(),
            file_path: None,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// Tagged union over the two job producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    #[serde(rename = "logs")]
    Log(LogJobMeta),
    Database(DatabaseJobMeta),
}

impl JobKind {
    pub fn job_type(&self) -> JobType {
        match self {
            JobKind::Log(_) => JobType::Logs,
            JobKind::Database(_) => JobType::Database,
        }
    }

    pub fn project(&self) -> &str {
        match self {
            JobKind::Log(meta) => &meta.project,
            JobKind::Database(meta) => &meta.project,
        }
    }

    pub fn environment(&self) -> &str {
        match self {
            JobKind::Log(meta) => &meta.environment,
            JobKind::Database(meta) => &meta.environment,
        }
    }

    /// Short human label: the container for log jobs, the database name for exports.
    pub fn target(&self) -> &str {
        match self {
            JobKind::Log(meta) => &meta.container,
            JobKind::Database(meta) => &meta.database,
        }
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Raw, monotonically increasing counters reported by a producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCounters {
    pub files_downloaded: u64,
    pub total_files: u64,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub current_file: Option<String>,
}

impl TransferCounters {
    /// Counters for a file-oriented transfer (log bundles).
    pub fn files(files_downloaded: u64, total_files: u64) -> Self {
        Self {
            files_downloaded,
            total_files,
            ..Self::default()
        }
    }

    /// Counters for a byte stream (database exports).
    pub fn bytes(bytes_downloaded: u64, total_bytes: u64) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            ..Self::default()
        }
    }

    pub fn with_bytes(mut self, bytes_downloaded: u64, total_bytes: u64) -> Self {
        self.bytes_downloaded = bytes_downloaded;
        self.total_bytes = total_bytes;
        self
    }

    pub fn with_current_file(mut self, name: impl Into<String>) -> Self {
        self.current_file = Some(name.into());
        self
    }

    /// Completion percentage (0-100).
    ///
    /// File counts win when the producer knows them; otherwise bytes are used.
    pub fn percentage(&self) -> u8 {
        let pct = if self.total_files > 0 {
            100.0 * self.files_downloaded as f64 / self.total_files as f64
        } else if self.total_bytes > 0 {
            100.0 * self.bytes_downloaded as f64 / self.total_bytes as f64
        } else {
            0.0
        };
        pct.round().clamp(0.0, 100.0) as u8
    }

    /// Bytes still to transfer, if the total is known.
    pub fn remaining_bytes(&self) -> Option<u64> {
        (self.total_bytes > 0).then(|| self.total_bytes.saturating_sub(self.bytes_downloaded))
    }
}

// =============================================================================
// JOB RECORD
// =============================================================================

/// One tracked download attempt.
///
/// Records handed out by the registry are snapshots; mutating one has no effect
/// on the tracked job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0-100, non-decreasing while active
    pub progress_percent: u8,
    /// Latest counters reported by the producer
    pub counters: TransferCounters,
    pub start_time: DateTime<Utc>,
    /// Set exactly when the status is terminal
    pub end_time: Option<DateTime<Utc>>,
    /// Failure reason, only for `failed` jobs
    pub error: Option<String>,
}

impl Job {
    /// Create a job in the `starting` state.
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Starting,
            progress_percent: 0,
            counters: TransferCounters::default(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn job_type(&self) -> JobType {
        self.kind.job_type()
    }

    /// Derived from the kind on every read; never stored.
    pub fn is_cancellable(&self) -> bool {
        self.job_type().cancel_policy() == CancelPolicy::Allowed
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time from start to end (or to now while still active).
    pub fn elapsed(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }

    /// Apply a producer or coordinator update.
    ///
    /// Progress only moves forward while active; a terminal update may overwrite
    /// it with the producer's final figure.
    pub(crate) fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> JobResult<()> {
        if self.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status,
            });
        }

        let next = match update.status {
            Some(status) => status,
            None if update.counters.is_some()
                && matches!(self.status, JobStatus::Starting | JobStatus::Pending) =>
            {
                JobStatus::InProgress
            }
            None => self.status,
        };
        if update.error.is_some() && next != JobStatus::Failed {
            return Err(JobError::InvalidUpdate {
                id: self.id.clone(),
                reason: format!("an error reason cannot accompany status '{}'", next),
            });
        }

        let reported = update
            .progress_percent
            .or_else(|| update.counters.as_ref().map(TransferCounters::percentage));
        if let Some(counters) = update.counters {
            self.counters = counters;
        }
        if let Some(pct) = reported {
            let pct = pct.min(100);
            self.progress_percent = if next.is_terminal() {
                pct
            } else {
                self.progress_percent.max(pct)
            };
        }

        if next == JobStatus::Failed {
            self.error = update.error;
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(now);
        }
        Ok(())
    }
}

/// A change reported against an active job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    status: Option<JobStatus>,
    progress_percent: Option<u8>,
    counters: Option<TransferCounters>,
    error: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final success report; progress is forced to 100.
    pub fn completed() -> Self {
        Self::new().status(JobStatus::Completed).progress(100)
    }

    /// Final failure report with a human-readable reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, percent: u8) -> Self {
        self.progress_percent = Some(percent);
        self
    }

    /// Attach raw counters. Unless an explicit percentage is also given, the
    /// job's progress is derived from them; without an explicit status a
    /// `starting` or `pending` job moves to `in_progress`.
    pub fn counters(mut self, counters: TransferCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.map_or(false, |s| s.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_job() -> Job {
        Job::new(
            JobId::mint(JobType::Logs),
            JobKind::Log(LogJobMeta::new("acme", "Production", "applogs")),
        )
    }

    #[test]
    fn test_minted_ids_carry_type_prefix() {
        let log = JobId::mint(JobType::Logs);
        let db = JobId::mint(JobType::Database);
        assert!(log.as_str().starts_with("logs-"));
        assert!(db.as_str().starts_with("db-"));
        assert_ne!(log, db);
        assert_eq!(log.as_str().len(), "logs-".len() + 14 + 1 + ID_SUFFIX_LEN);
    }

    #[test]
    fn test_status_aliases() {
        assert_eq!("complete".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert_eq!("error".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert_eq!("In-Progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert!(matches!(
            "bogus".parse::<JobStatus>(),
            Err(JobError::InvalidParameter { name: "status", .. })
        ));
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(JobStatus::Pending.bucket(), StatusBucket::Active);
        assert_eq!(JobStatus::Completed.bucket(), StatusBucket::Completed);
        assert_eq!(JobStatus::Cancelled.bucket(), StatusBucket::Failed);
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Starting.is_active());
    }

    #[test]
    fn test_cancellable_is_derived_from_kind() {
        assert!(log_job().is_cancellable());
        let db = Job::new(
            JobId::mint(JobType::Database),
            JobKind::Database(DatabaseJobMeta::new("acme", "Integration", "cms")),
        );
        assert!(!db.is_cancellable());
    }

    #[test]
    fn test_percentage_prefers_files_then_bytes() {
        assert_eq!(TransferCounters::files(3, 10).percentage(), 30);
        assert_eq!(TransferCounters::files(0, 10).with_bytes(900, 1000).percentage(), 0);
        assert_eq!(TransferCounters::bytes(250, 1000).percentage(), 25);
        assert_eq!(TransferCounters::bytes(1, 3).percentage(), 33);
        assert_eq!(TransferCounters::default().percentage(), 0);
        assert_eq!(TransferCounters::bytes(5000, 1000).percentage(), 100);
    }

    #[test]
    fn test_progress_is_monotonic_while_active() {
        let mut job = log_job();
        let now = Utc::now();
        job.apply(JobUpdate::new().progress(40), now).unwrap();
        job.apply(JobUpdate::new().progress(20), now).unwrap();
        assert_eq!(job.progress_percent, 40);
        assert_eq!(job.end_time, None);
    }

    #[test]
    fn test_terminal_update_sets_end_time_and_freezes() {
        let mut job = log_job();
        let now = Utc::now();
        job.apply(JobUpdate::new().counters(TransferCounters::files(3, 10)), now).unwrap();
        assert_eq!(job.progress_percent, 30);

        job.apply(JobUpdate::failed("disk full"), now).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress_percent, 30);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert_eq!(job.end_time, Some(now));

        let err = job.apply(JobUpdate::new().status(JobStatus::Running), now).unwrap_err();
        assert!(matches!(err, JobError::AlreadyTerminal { status: JobStatus::Failed, .. }));
    }

    #[test]
    fn test_counters_promote_only_waiting_jobs() {
        let now = Utc::now();
        let counters = || JobUpdate::new().counters(TransferCounters::files(1, 10));

        let mut job = log_job();
        job.apply(counters(), now).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let mut job = log_job();
        job.apply(JobUpdate::new().status(JobStatus::Pending), now).unwrap();
        job.apply(counters(), now).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);

        let mut job = log_job();
        job.apply(JobUpdate::new().status(JobStatus::Running), now).unwrap();
        job.apply(counters(), now).unwrap();
        assert_eq!(job.status, JobStatus::Running);

        // A bare percentage is not a transfer report
        let mut job = log_job();
        job.apply(JobUpdate::new().progress(5), now).unwrap();
        assert_eq!(job.status, JobStatus::Starting);
    }

    #[test]
    fn test_error_requires_failed_status() {
        let mut job = log_job();
        let update = JobUpdate::failed("boom").status(JobStatus::Running);
        let err = job.apply(update, Utc::now()).unwrap_err();
        assert!(matches!(err, JobError::InvalidUpdate { .. }));
        assert_eq!(job.status, JobStatus::Starting);
    }

    #[test]
    fn test_job_serializes_camel_case_with_type_tag() {
        let job = log_job();
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"progressPercent\":0"));
        assert!(json.contains("\"type\":\"logs\""));
        assert!(json.contains("\"status\":\"starting\""));
        assert!(json.contains("\"endTime\":null"));
    }
}
