// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Unified Query Facade
//!
//! One filterable, paginated view over both job populations (log downloads and
//! database exports). The rules:
//!
//! - The status filter is applied to each population separately through the
//!   shared bucket mapping, then the two results are concatenated.
//! - The merged list is always ordered by start time, newest first.
//! - `limit`/`offset` apply to the merged, sorted list. The `active` view ignores
//!   them and returns every active job.
//! - Bad parameters are rejected before the registry is read, never clamped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};
use crate::registry::JobRegistry;
use crate::types::{Job, JobStatus, JobType, StatusBucket};

/// Largest accepted page size.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Page size used when the caller does not pass one.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Which statuses a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Completed,
    Failed,
    All,
}

impl StatusFilter {
    pub fn matches(&self, status: JobStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status.bucket() == StatusBucket::Active,
            StatusFilter::Completed => status.bucket() == StatusBucket::Completed,
            StatusFilter::Failed => status.bucket() == StatusBucket::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Active => "active",
            StatusFilter::Completed => "completed",
            StatusFilter::Failed => "failed",
            StatusFilter::All => "all",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            "failed" => Ok(StatusFilter::Failed),
            "all" => Ok(StatusFilter::All),
            _ => Err(JobError::InvalidParameter {
                name: "status",
                message: format!("expected active, completed, failed or all, got '{}'", s),
            }),
        }
    }
}

/// Which job populations a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    Logs,
    Database,
    All,
}

impl TypeFilter {
    pub fn includes(&self, job_type: JobType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Logs => job_type == JobType::Logs,
            TypeFilter::Database => job_type == JobType::Database,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logs" => Ok(TypeFilter::Logs),
            "database" => Ok(TypeFilter::Database),
            "all" => Ok(TypeFilter::All),
            _ => Err(JobError::InvalidParameter {
                name: "type",
                message: format!("expected logs, database or all, got '{}'", s),
            }),
        }
    }
}

/// A validated listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub status: StatusFilter,
    pub job_type: TypeFilter,
    pub limit: usize,
    pub offset: usize,
}

impl ListQuery {
    /// First page with the default page size.
    pub fn new(status: StatusFilter, job_type: TypeFilter) -> Self {
        Self {
            status,
            job_type,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }

    /// Validate raw caller input. Nothing is read from the registry here.
    pub fn parse(status: &str, job_type: &str, limit: i64, offset: i64) -> JobResult<Self> {
        Ok(Self {
            status: status.parse()?,
            job_type: job_type.parse()?,
            limit: validate_limit(limit)?,
            offset: validate_offset(offset)?,
        })
    }
}

/// Check a page size against `0..=100`.
pub fn validate_limit(limit: i64) -> JobResult<usize> {
    if (0..=MAX_LIST_LIMIT).contains(&limit) {
        Ok(limit as usize)
    } else {
        Err(JobError::InvalidParameter {
            name: "limit",
            message: format!("must be between 0 and {}, got {}", MAX_LIST_LIMIT, limit),
        })
    }
}

/// Check that an offset is not negative.
pub fn validate_offset(offset: i64) -> JobResult<usize> {
    usize::try_from(offset).map_err(|_| JobError::InvalidParameter {
        name: "offset",
        message: format!("must be 0 or greater, got {}", offset),
    })
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<Job>,
    /// Matching jobs before pagination
    pub total_count: usize,
    pub has_more: bool,
}

/// Read-only facade over the registry's two job populations.
#[derive(Debug, Clone)]
pub struct JobQuery {
    registry: Arc<JobRegistry>,
}

impl JobQuery {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    pub fn list(&self, query: &ListQuery) -> ListPage {
        let jobs = self.registry.list(query.status == StatusFilter::Active);
        let (logs, databases): (Vec<Job>, Vec<Job>) =
            jobs.into_iter().partition(|job| job.job_type() == JobType::Logs);

        let mut merged = Vec::new();
        if query.job_type.includes(JobType::Logs) {
            merged.extend(filter_status(logs, query.status));
        }
        if query.job_type.includes(JobType::Database) {
            merged.extend(filter_status(databases, query.status));
        }
        merged.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total_count = merged.len();
        if query.status == StatusFilter::Active {
            return ListPage {
                items: merged,
                total_count,
                has_more: false,
            };
        }

        let items: Vec<Job> = merged
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        let has_more = query.offset.saturating_add(items.len()) < total_count;
        ListPage {
            items,
            total_count,
            has_more,
        }
    }

    /// Validate raw parameters, then list.
    pub fn list_raw(&self, status: &str, job_type: &str, limit: i64, offset: i64) -> JobResult<ListPage> {
        let query = ListQuery::parse(status, job_type, limit, offset)?;
        Ok(self.list(&query))
    }
}

fn filter_status(jobs: Vec<Job>, filter: StatusFilter) -> impl Iterator<Item = Job> {
    jobs.into_iter().filter(move |job| filter.matches(job.status))
}
