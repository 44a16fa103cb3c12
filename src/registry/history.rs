// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded buffer of finished jobs, oldest evicted first.

use indexmap::IndexMap;

use crate::types::{Job, JobId};

/// Default number of finished jobs kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Finished jobs in the order they reached a terminal status.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    jobs: IndexMap<JobId, Job>,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` jobs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            jobs: IndexMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Append a finished job, then evict from the front while over capacity.
    /// Returns the ids that aged out.
    pub fn push(&mut self, job: Job) -> Vec<JobId> {
        self.jobs.insert(job.id.clone(), job);
        let mut evicted = Vec::new();
        while self.jobs.len() > self.capacity {
            match self.evict_oldest() {
                Some(id) => evicted.push(id),
                None => break,
            }
        }
        evicted
    }

    fn evict_oldest(&mut self) -> Option<JobId> {
        self.jobs.shift_remove_index(0).map(|(id, _)| id)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
