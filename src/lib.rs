// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! jobwatch - Background job tracking for long-running downloads
//!
//! Tracks environment log bundle downloads and database export downloads while
//! they run: live progress (bytes, files, speed, ETA), a unified filterable
//! listing across both job kinds, cancellation where the job kind allows it, and
//! a bounded poll-until-done monitor.
//!
//! **Producer** -> **Registry** (active + history) -> **List / Status / Cancel**
//!
//! # Core Modules
//!
//! - [`types`] - Job record, ids, statuses, job kinds and transfer counters
//! - [`registry`] - Active table and capped history, terminal transitions
//! - [`progress`] - Speed/ETA sampling and display helpers
//! - [`cancel`] - Cancellation policy and the producer cancel signal
//! - [`query`] - Merged, filtered, paginated listing
//! - [`monitor`] - Poll loop for one job
//! - [`reporter`] - Producer-facing reporting handle
//! - [`tracker`] - Service wiring everything together
//! - [`config`] - `~/.jobwatch/config.json` loading
//! - [`error`] - Error taxonomy and CLI rendering
//!
//! # Example
//!
//! ```
//! use jobwatch::{JobTracker, LogJobMeta, TransferCounters};
//!
//! let tracker = JobTracker::default();
//! let (reporter, _signal) = tracker
//!     .start_log_job(LogJobMeta::new("acme", "Production", "applogs"))
//!     .unwrap();
//! reporter.progress(TransferCounters::files(3, 10)).unwrap();
//!
//! let page = tracker.list("active", "all", None, 0).unwrap();
//! assert_eq!(page.items[0].progress_percent, 30);
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod locks;
pub mod monitor;
pub mod progress;
pub mod query;
pub mod registry;
pub mod reporter;
pub mod tracker;
pub mod types;

pub use cancel::{CancelAllReport, CancelRejection, CancelSignal, CancellationCoordinator};
pub use config::{MonitorSettings, TrackerConfig};
pub use error::{format_error, JobError, JobResult};
pub use monitor::{Monitor, MonitorConfig, MonitorOutcome, MonitorReport};
pub use progress::{LiveProgress, ProgressSampler};
pub use query::{JobQuery, ListPage, ListQuery, StatusFilter, TypeFilter};
pub use registry::{JobCounts, JobRegistry};
pub use reporter::JobReporter;
pub use tracker::{JobTracker, StatusReport};
pub use types::{
    DatabaseJobMeta, Job, JobId, JobKind, JobStatus, JobType, JobUpdate, LogJobMeta, TransferCounters,
};
