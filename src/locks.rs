// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poison-recovering lock helpers.
//!
//! The registry and the progress sampler each keep all of their state behind one
//! `RwLock`. A panic in one producer's callback must not take job tracking down for
//! every other job, so a poisoned lock is logged and recovered instead of
//! propagating the panic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering the guard if the lock is poisoned.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "jobwatch::locks",
                event = "LOCK_POISONED_READ",
                "RwLock was poisoned during read acquisition; recovering job state"
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering the guard if the lock is poisoned.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "jobwatch::locks",
                event = "LOCK_POISONED_WRITE",
                "RwLock was poisoned during write acquisition; recovering job state"
            );
            poisoned.into_inner()
        }
    }
}
