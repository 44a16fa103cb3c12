// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Race Detection Tests for jobwatch
//!
//! These tests hammer the tracker from many tasks at once and check the
//! registry's invariants afterwards. They are designed to detect data races when
//! run with ThreadSanitizer (TSAN).
//!
//! # Running with ThreadSanitizer
//!
//! ```bash
//! # On Linux with nightly Rust:
//! RUSTFLAGS="-Z sanitizer=thread" cargo +nightly test --target x86_64-unknown-linux-gnu --test race_detection_test
//! ```
//!
//! # Test Categories
//!
//! - Concurrent registration (id uniqueness)
//! - Producers racing readers (exclusive membership, monotonic status)
//! - Cancel-all racing producers (partition completeness)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jobwatch::{
    DatabaseJobMeta, JobError, JobId, JobStatus, JobTracker, LogJobMeta, TrackerConfig, TransferCounters,
};
use jobwatch::registry::Location;
use tokio::time::timeout;

// Test configuration
const CONCURRENCY_LEVEL: usize = 50;
const ITERATIONS_PER_TASK: usize = 20;
const TEST_TIMEOUT_SECS: u64 = 30;

fn tracker() -> Arc<JobTracker> {
    let config = TrackerConfig {
        history_capacity: CONCURRENCY_LEVEL * ITERATIONS_PER_TASK * 2,
        ..TrackerConfig::default()
    };
    Arc::new(JobTracker::new(&config))
}

fn log_meta(i: usize) -> LogJobMeta {
    LogJobMeta::new("acme", "Production", format!("container-{}", i))
}

fn db_meta(i: usize) -> DatabaseJobMeta {
    DatabaseJobMeta::new("acme", "Production", format!("db-{}", i))
}

// =============================================================================
// REGISTRATION TESTS
// =============================================================================

/// Ids stay unique when both producers register at the same time.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_ids_unique() {
    let tracker = tracker();

    let mut handles = Vec::new();
    for task in 0..CONCURRENCY_LEVEL {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::with_capacity(ITERATIONS_PER_TASK);
            for i in 0..ITERATIONS_PER_TASK {
                let started = if (task + i) % 2 == 0 {
                    tracker.start_log_job(log_meta(i)).map(|(reporter, _signal)| reporter)
                } else {
                    tracker.start_database_job(db_meta(i))
                };
                let reporter = started.expect("registration failed");
                ids.push(reporter.id().clone());
                reporter.complete().expect("complete failed");
            }
            ids
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.expect("task panicked"));
        }
        all
    })
    .await;

    assert!(result.is_ok(), "Test timed out");
    let ids = result.unwrap();
    let unique: HashSet<&JobId> = ids.iter().collect();
    assert_eq!(unique.len(), CONCURRENCY_LEVEL * ITERATIONS_PER_TASK, "Duplicate job ids minted");
    assert_eq!(tracker.counts().completed, CONCURRENCY_LEVEL * ITERATIONS_PER_TASK);
}

// =============================================================================
// PRODUCER VS READER TESTS
// =============================================================================

/// Readers never see a job in both tables or in neither, and never see a
/// terminal status change.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producers_racing_readers() {
    let tracker = tracker();
    let mut producers = Vec::new();
    let mut ids = Vec::new();

    for i in 0..CONCURRENCY_LEVEL {
        let reporter = tracker.start_database_job(db_meta(i)).unwrap();
        ids.push(reporter.id().clone());
        producers.push(tokio::spawn(async move {
            for step in 1..=ITERATIONS_PER_TASK as u64 {
                reporter
                    .progress(TransferCounters::bytes(step, ITERATIONS_PER_TASK as u64))
                    .expect("progress failed");
                tokio::task::yield_now().await;
            }
            if i % 3 == 0 {
                reporter.fail("connection reset").expect("fail failed");
            } else {
                reporter.complete().expect("complete failed");
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..8 {
        let tracker = Arc::clone(&tracker);
        let ids = ids.clone();
        readers.push(tokio::spawn(async move {
            let mut seen_terminal: Vec<Option<JobStatus>> = vec![None; ids.len()];
            for _ in 0..ITERATIONS_PER_TASK * 5 {
                for (slot, id) in ids.iter().enumerate() {
                    assert!(
                        tracker.registry().location(id).is_some(),
                        "Job {} missing from both tables",
                        id
                    );
                    let job = tracker.status(id).expect("registered job not found").job;
                    if let Some(terminal) = seen_terminal[slot] {
                        assert_eq!(job.status, terminal, "Terminal status changed for {}", id);
                    } else if job.is_terminal() {
                        seen_terminal[slot] = Some(job.status);
                    }
                }
                let page = tracker.list("all", "all", Some(100), 0).expect("list failed");
                let listed: HashSet<&JobId> = page.items.iter().map(|j| &j.id).collect();
                assert_eq!(listed.len(), page.items.len(), "Job listed twice");
                tokio::task::yield_now().await;
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in producers.into_iter().chain(readers) {
            handle.await.expect("task panicked");
        }
    })
    .await;

    assert!(result.is_ok(), "Test timed out");
    for id in &ids {
        assert_eq!(tracker.registry().location(id), Some(Location::History));
    }
    let counts = tracker.counts();
    assert_eq!(counts.active, 0);
    assert_eq!(counts.completed + counts.failed, CONCURRENCY_LEVEL);
}

// =============================================================================
// CANCELLATION TESTS
// =============================================================================

/// Cancel-all accounts for every job active at call time exactly once, even
/// while producers keep reporting and finishing.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_partition_under_load() {
    let tracker = tracker();
    let mut producers = Vec::new();
    let mut log_ids = HashSet::new();
    let mut db_ids = HashSet::new();

    for i in 0..CONCURRENCY_LEVEL {
        if i % 2 == 0 {
            let (reporter, mut signal) = tracker.start_log_job(log_meta(i)).unwrap();
            log_ids.insert(reporter.id().clone());
            producers.push(tokio::spawn(async move {
                for step in 1..=ITERATIONS_PER_TASK as u64 {
                    if signal.is_cancelled() {
                        return;
                    }
                    if reporter
                        .progress(TransferCounters::files(step, ITERATIONS_PER_TASK as u64 * 2))
                        .is_err()
                    {
                        return;
                    }
                    tokio::task::yield_now().await;
                }
                // Half of the log jobs finish on their own, racing the cancel
                if i % 4 == 0 {
                    let _ = reporter.complete();
                } else {
                    signal.cancelled().await;
                }
            }));
        } else {
            let reporter = tracker.start_database_job(db_meta(i)).unwrap();
            db_ids.insert(reporter.id().clone());
            producers.push(tokio::spawn(async move {
                for step in 1..=ITERATIONS_PER_TASK as u64 {
                    reporter
                        .progress(TransferCounters::bytes(step, ITERATIONS_PER_TASK as u64))
                        .expect("database progress failed");
                    tokio::task::yield_now().await;
                }
                reporter.complete().expect("database complete failed");
            }));
        }
    }

    let active_before: HashSet<JobId> = tracker.registry().list(true).into_iter().map(|j| j.id).collect();
    let report = tracker.cancel_all();

    let mut accounted = HashSet::new();
    for id in report
        .cancelled
        .iter()
        .chain(report.skipped.iter().map(|r| &r.id))
        .chain(report.failed.iter().map(|r| &r.id))
    {
        assert!(accounted.insert(id.clone()), "Job {} in two buckets", id);
    }
    assert!(accounted.is_subset(&active_before));
    assert!(report.total() <= CONCURRENCY_LEVEL);
    for rejection in &report.skipped {
        assert!(db_ids.contains(&rejection.id), "Log job {} skipped", rejection.id);
    }
    for id in &report.cancelled {
        assert!(log_ids.contains(id), "Database job {} cancelled", id);
        assert_eq!(tracker.status(id).unwrap().job.status, JobStatus::Cancelled);
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in producers {
            handle.await.expect("task panicked");
        }
    })
    .await;
    assert!(result.is_ok(), "Test timed out");

    // Every database job still finishes normally
    for id in &db_ids {
        assert_eq!(tracker.status(id).unwrap().job.status, JobStatus::Completed);
    }
    // Nothing left running once the producers are gone
    assert_eq!(tracker.counts().active, 0);
}

/// Many tasks cancelling the same log job: exactly one wins.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_single_winner() {
    let tracker = tracker();
    let (reporter, _signal) = tracker.start_log_job(log_meta(0)).unwrap();
    let id = reporter.id().clone();

    let mut handles = Vec::new();
    for _ in 0..CONCURRENCY_LEVEL {
        let tracker = Arc::clone(&tracker);
        let id = id.clone();
        handles.push(tokio::spawn(async move { tracker.cancel(&id) }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("task panicked"));
        }
        outcomes
    })
    .await;

    assert!(result.is_ok(), "Test timed out");
    let outcomes = result.unwrap();
    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(wins, 1, "Exactly one cancel should succeed");
    for outcome in outcomes.iter().filter(|o| o.is_err()) {
        assert_eq!(outcome, &Err(JobError::NotFound(id.clone())));
    }
    drop(reporter);
    assert_eq!(tracker.status(&id).unwrap().job.status, JobStatus::Cancelled);
}
