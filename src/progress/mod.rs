// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress Sampler
//!
//! Turns the raw counters a producer reports into a live snapshot (percentage,
//! speed, ETA). Producers never compute speed themselves: the sampler keeps the
//! previous sample per job and derives speed from the delta to the current one.
//!
//! Sampling is pull-based. Each call to [`ProgressSampler::sample`] replaces the
//! job's cached sample, so speed reflects the interval between consecutive
//! queries, not the time since the transfer started.

pub mod format;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::locks::{resilient_read, resilient_write};
use crate::types::{JobId, TransferCounters};

pub use format::{format_bytes, format_duration, format_speed};

/// Previous observation kept for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    bytes: u64,
    at: DateTime<Utc>,
}

/// Derived progress for one job at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveProgress {
    /// 0-100
    pub percentage: u8,
    /// 0 until a second sample exists
    pub speed_bytes_per_sec: u64,
    /// Unknown while speed is 0 or the total size is unknown
    pub eta_seconds: Option<u64>,
    pub current_file: Option<String>,
    pub files_downloaded: u64,
    pub total_files: u64,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
}

impl LiveProgress {
    /// Formatted speed, if any data has moved since the last sample.
    pub fn speed_string(&self) -> Option<String> {
        (self.speed_bytes_per_sec > 0).then(|| format_speed(self.speed_bytes_per_sec))
    }

    /// Formatted ETA, if one can be estimated.
    pub fn eta_string(&self) -> Option<String> {
        self.eta_seconds.map(format_duration)
    }
}

/// Per-job sample cache.
#[derive(Debug, Default)]
pub struct ProgressSampler {
    samples: RwLock<HashMap<JobId, Sample>>,
}

impl ProgressSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `counters` observed at `at` and return the derived snapshot.
    pub fn sample(&self, id: &JobId, counters: &TransferCounters, at: DateTime<Utc>) -> LiveProgress {
        let current = Sample {
            bytes: counters.bytes_downloaded,
            at,
        };
        let previous = resilient_write(&self.samples).insert(id.clone(), current);

        let speed = previous.map_or(0, |prev| bytes_per_sec(&prev, &current));
        let eta_seconds = match counters.remaining_bytes() {
            Some(remaining) if speed > 0 => Some((remaining as f64 / speed as f64).round() as u64),
            _ => None,
        };

        LiveProgress {
            percentage: counters.percentage(),
            speed_bytes_per_sec: speed,
            eta_seconds,
            current_file: counters.current_file.clone(),
            files_downloaded: counters.files_downloaded,
            total_files: counters.total_files,
            bytes_downloaded: counters.bytes_downloaded,
            total_bytes: counters.total_bytes,
        }
    }

    /// Sample using the current wall clock.
    pub fn sample_now(&self, id: &JobId, counters: &TransferCounters) -> LiveProgress {
        self.sample(id, counters, Utc::now())
    }

    /// Drop the cached sample for a job that reached a terminal status.
    pub fn forget(&self, id: &JobId) {
        if resilient_write(&self.samples).remove(id).is_some() {
            tracing::debug!(job_id = %id, "Cleared progress sample cache");
        }
    }

    /// Number of jobs with a cached sample.
    pub fn tracked(&self) -> usize {
        resilient_read(&self.samples).len()
    }
}

/// Speed between two samples. Zero when time did not advance or the counter went
/// backwards (a restarted transfer).
fn bytes_per_sec(prev: &Sample, current: &Sample) -> u64 {
    let elapsed_ms = (current.at - prev.at).num_milliseconds();
    if elapsed_ms <= 0 || current.bytes < prev.bytes {
        return 0;
    }
    let delta = (current.bytes - prev.bytes) as f64;
    (delta / (elapsed_ms as f64 / 1000.0)).round() as u64
}
