// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end scenarios against the public `JobTracker` API.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use jobwatch::{
    DatabaseJobMeta, Job, JobError, JobId, JobKind, JobStatus, JobTracker, JobUpdate, ListQuery,
    LogJobMeta, MonitorOutcome, MonitorSettings, ProgressSampler, StatusFilter, TrackerConfig,
    TransferCounters, TypeFilter,
};

fn log_meta() -> LogJobMeta {
    LogJobMeta::new("acme", "Production", "insights-logs-appserviceconsolelogs")
}

fn db_meta() -> DatabaseJobMeta {
    DatabaseJobMeta::new("acme", "Production", "cms")
}

fn fast_monitor(max_polls: u32) -> TrackerConfig {
    TrackerConfig {
        monitor: MonitorSettings {
            poll_interval_secs: 10,
            initial_delay_secs: 2,
            max_polls,
        },
        ..TrackerConfig::default()
    }
}

// =============================================================================
// LIFECYCLE SCENARIOS
// =============================================================================

#[test]
fn test_log_job_progress_then_cancel() {
    let tracker = JobTracker::default();
    let (reporter, mut signal) = tracker.start_log_job(log_meta()).unwrap();
    reporter.progress(TransferCounters::files(3, 10)).unwrap();

    let page = tracker.list("active", "all", None, 0).unwrap();
    let listed = page.items.iter().find(|j| &j.id == reporter.id()).unwrap();
    assert_eq!(listed.progress_percent, 30);

    let job = tracker.cancel(reporter.id()).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress_percent, 30);
    assert!(job.end_time.is_some());
    assert!(signal.is_cancelled());

    let page = tracker.list("active", "all", None, 0).unwrap();
    assert!(page.items.is_empty());
    let page = tracker.list("failed", "logs", None, 0).unwrap();
    assert_eq!(page.items.len(), 1);
}

#[test]
fn test_database_job_cannot_be_cancelled() {
    let tracker = JobTracker::default();
    let reporter = tracker.start_database_job(db_meta()).unwrap();
    reporter.progress(TransferCounters::bytes(1_000, 4_000)).unwrap();

    let err = tracker.cancel(reporter.id()).unwrap_err();
    assert!(matches!(err, JobError::NonCancellable { .. }));
    assert!(err.to_string().contains("cannot be interrupted"));

    let status = tracker.status(reporter.id()).unwrap();
    assert_eq!(status.job.status, JobStatus::InProgress);
    assert_eq!(status.job.progress_percent, 25);
    assert!(!status.job.is_cancellable());
}

#[test]
fn test_completed_job_moves_to_history() {
    let tracker = JobTracker::default();
    let reporter = tracker.start_database_job(db_meta()).unwrap();
    reporter.complete().unwrap();

    let report = tracker.status(reporter.id()).unwrap();
    assert_eq!(report.job.status, JobStatus::Completed);
    assert_eq!(report.job.progress_percent, 100);
    assert!(report.live.is_none());

    let active = tracker.list("active", "all", None, 0).unwrap();
    assert!(active.items.iter().all(|j| &j.id != reporter.id()));
    let completed = tracker.list("completed", "database", None, 0).unwrap();
    assert_eq!(completed.items.len(), 1);
}

#[test]
fn test_bogus_status_is_rejected_before_registry() {
    let tracker = JobTracker::default();
    let err = tracker.list("bogus", "all", Some(10), 0).unwrap_err();
    assert!(matches!(err, JobError::InvalidParameter { name: "status", .. }));

    let err = tracker.list("all", "pdf", Some(10), 0).unwrap_err();
    assert!(matches!(err, JobError::InvalidParameter { name: "type", .. }));
    assert_eq!(tracker.counts().active, 0);
}

#[test]
fn test_terminal_status_never_changes() {
    let tracker = JobTracker::default();
    let reporter = tracker.start_database_job(db_meta()).unwrap();
    reporter.fail("storage account unreachable").unwrap();

    assert!(matches!(
        reporter.complete(),
        Err(JobError::AlreadyTerminal { status: JobStatus::Failed, .. })
    ));
    let job = tracker.status(reporter.id()).unwrap().job;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("storage account unreachable"));
}

#[test]
fn test_unknown_id_is_not_found() {
    let tracker = JobTracker::default();
    let id = JobId::new("logs-20250101000000-ZZZZZZ");
    assert_eq!(tracker.status(&id).unwrap_err(), JobError::NotFound(id.clone()));
    assert_eq!(tracker.cancel(&id).unwrap_err(), JobError::NotFound(id));
}

// =============================================================================
// LIST CONSISTENCY
// =============================================================================

fn register_at(tracker: &JobTracker, id: &str, kind: JobKind, minute: u32) -> JobId {
    let start = Utc.with_ymd_and_hms(2025, 1, 14, 9, minute, 0).unwrap();
    let job = Job::new(JobId::new(id), kind).with_start_time(start);
    tracker.registry().register(job, None).unwrap()
}

#[test]
fn test_all_view_is_sorted_across_kinds_then_paginated() {
    let tracker = JobTracker::default();
    register_at(&tracker, "logs-a", JobKind::Log(log_meta()), 1);
    register_at(&tracker, "db-b", JobKind::Database(db_meta()), 2);
    register_at(&tracker, "logs-c", JobKind::Log(log_meta()), 3);
    register_at(&tracker, "db-d", JobKind::Database(db_meta()), 4);
    let done = register_at(&tracker, "db-e", JobKind::Database(db_meta()), 5);
    tracker.registry().update(&done, JobUpdate::completed()).unwrap();

    let page = tracker.list("all", "all", Some(2), 1).unwrap();
    let ids: Vec<&str> = page.items.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["db-d", "logs-c"]);
    assert_eq!(page.total_count, 5);
    assert!(page.has_more);

    let page = tracker.list("all", "all", Some(10), 3).unwrap();
    let ids: Vec<&str> = page.items.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["db-b", "logs-a"]);
    assert!(!page.has_more);

    let page = tracker.list("all", "all", Some(10), 9).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 5);
}

#[test]
fn test_active_view_ignores_pagination() {
    let tracker = JobTracker::default();
    for minute in 0..5 {
        register_at(&tracker, &format!("logs-{}", minute), JobKind::Log(log_meta()), minute);
    }

    let page = tracker.list("active", "all", Some(1), 3).unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total_count, 5);
    assert!(!page.has_more);
    assert_eq!(page.items[0].id, JobId::new("logs-4"));
}

#[test]
fn test_limit_zero_returns_count_only() {
    let tracker = JobTracker::default();
    register_at(&tracker, "db-1", JobKind::Database(db_meta()), 1);

    let page = tracker.list_query(&ListQuery {
        limit: 0,
        ..ListQuery::new(StatusFilter::All, TypeFilter::All)
    });
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 1);
    assert!(page.has_more);
}

#[test]
fn test_history_capacity_evicts_oldest() {
    let config = TrackerConfig {
        history_capacity: 2,
        ..TrackerConfig::default()
    };
    let tracker = JobTracker::new(&config);
    let mut ids = Vec::new();
    for _ in 0..3 {
        let reporter = tracker.start_database_job(db_meta()).unwrap();
        reporter.complete().unwrap();
        ids.push(reporter.id().clone());
    }

    assert!(matches!(tracker.status(&ids[0]), Err(JobError::NotFound(_))));
    assert!(tracker.status(&ids[1]).is_ok());
    assert!(tracker.status(&ids[2]).is_ok());
    assert_eq!(tracker.counts().completed, 2);
}

// =============================================================================
// PROGRESS SAMPLING
// =============================================================================

#[test]
fn test_sampler_bootstrap_then_speed() {
    let sampler = ProgressSampler::new();
    let id = JobId::new("db-1");
    let t0 = Utc::now();

    let first = sampler.sample(&id, &TransferCounters::bytes(0, 2_000_000), t0);
    assert_eq!(first.speed_bytes_per_sec, 0);
    assert_eq!(first.eta_seconds, None);

    let second = sampler.sample(
        &id,
        &TransferCounters::bytes(500_000, 2_000_000),
        t0 + chrono::Duration::seconds(5),
    );
    assert_eq!(second.speed_bytes_per_sec, 100_000);
    assert_eq!(second.eta_seconds, Some(15));
}

// =============================================================================
// MONITORING
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_monitor_follows_job_to_completion() {
    let tracker = std::sync::Arc::new(JobTracker::new(&fast_monitor(180)));
    let reporter = tracker.start_database_job(db_meta()).unwrap();
    let id = reporter.id().clone();

    let producer = tokio::spawn(async move {
        for chunk in 1..=3u64 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            reporter.progress(TransferCounters::bytes(chunk * 100, 300)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        reporter.complete().unwrap();
    });

    let mut streamed = Vec::new();
    let report = tracker
        .monitor(&id, std::future::pending::<()>(), |line| streamed.push(line.to_string()))
        .await;
    producer.await.unwrap();

    match &report.outcome {
        MonitorOutcome::Finished(job) => assert_eq!(job.status, JobStatus::Completed),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(report.error().is_none());
    assert_eq!(streamed, report.updates);
    assert!(report.updates.last().unwrap().contains("completed"));
    assert!(report.polls >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_timeout_leaves_job_running() {
    let tracker = JobTracker::new(&fast_monitor(3));
    let (reporter, mut signal) = tracker.start_log_job(log_meta()).unwrap();
    reporter.progress(TransferCounters::files(1, 10)).unwrap();

    let report = tracker
        .monitor(reporter.id(), std::future::pending::<()>(), |_| {})
        .await;

    assert!(matches!(report.outcome, MonitorOutcome::TimedOut(_)));
    assert!(matches!(report.error(), Some(JobError::MonitorTimeout { polls: 3, .. })));
    assert_eq!(report.updates.len(), 3);
    assert!(!signal.is_cancelled());
    assert_eq!(tracker.status(reporter.id()).unwrap().job.status, JobStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_sample_cache_empty_after_monitor_timeout_and_finish() {
    let tracker = JobTracker::new(&fast_monitor(2));
    let reporter = tracker.start_database_job(db_meta()).unwrap();
    reporter.progress(TransferCounters::bytes(100, 1_000)).unwrap();

    let report = tracker
        .monitor(reporter.id(), std::future::pending::<()>(), |_| {})
        .await;
    assert!(matches!(report.outcome, MonitorOutcome::TimedOut(_)));
    assert_eq!(tracker.sampler().tracked(), 1);

    tracker
        .registry()
        .update(reporter.id(), JobUpdate::completed())
        .unwrap();
    assert_eq!(tracker.sampler().tracked(), 0);
    assert!(tracker.status(reporter.id()).unwrap().live.is_none());
    assert_eq!(tracker.sampler().tracked(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_unknown_job() {
    let tracker = JobTracker::new(&fast_monitor(180));
    let id = JobId::new("db-20250101000000-AAAAAA");

    let report = tracker.monitor(&id, std::future::pending::<()>(), |_| {}).await;
    assert_eq!(report.outcome, MonitorOutcome::NotFound);
    assert_eq!(report.polls, 1);
    assert_eq!(report.error(), Some(JobError::NotFound(id)));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_when_caller_goes_away() {
    let tracker = JobTracker::new(&fast_monitor(180));
    let reporter = tracker.start_database_job(db_meta()).unwrap();

    let stop = tokio::time::sleep(Duration::from_secs(25));
    let report = tracker.monitor(reporter.id(), stop, |_| {}).await;

    assert_eq!(report.outcome, MonitorOutcome::Stopped);
    assert!(report.error().is_none());
    assert_eq!(report.polls, 3);
    assert!(tracker.status(reporter.id()).unwrap().job.status.is_active());
}
