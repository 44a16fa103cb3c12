// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cancellation channel handed to a producer when its job is created.

use std::future;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Create a connected handle/signal pair.
///
/// The registry keeps the [`CancelHandle`] with the active job; the producer keeps
/// the [`CancelSignal`] and watches it while transferring.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = oneshot::channel();
    (
        CancelHandle { tx: Some(tx) },
        CancelSignal {
            rx: Some(rx),
            fired: false,
        },
    )
}

/// Sending side of a job's cancellation channel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    /// Signal the producer. Returns false if the signal could not be delivered:
    /// the producer dropped its [`CancelSignal`], or the handle was already used.
    pub fn signal(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Receiving side of a job's cancellation channel.
#[derive(Debug)]
pub struct CancelSignal {
    rx: Option<oneshot::Receiver<()>>,
    fired: bool,
}

impl CancelSignal {
    /// Wait until the job is cancelled.
    ///
    /// Resolves only on a real cancellation. If the handle goes away without
    /// signalling (the job finished and left the active table), this never
    /// resolves, so it is safe to race against the transfer in `tokio::select!`.
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }
        match self.rx.as_mut() {
            Some(rx) => match rx.await {
                Ok(()) => {
                    self.fired = true;
                    self.rx = None;
                }
                Err(_) => {
                    self.rx = None;
                    future::pending::<()>().await;
                }
            },
            None => future::pending::<()>().await,
        }
    }

    /// Non-blocking check, for producers that poll between chunks.
    pub fn is_cancelled(&mut self) -> bool {
        if self.fired {
            return true;
        }
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(()) => {
                self.fired = true;
                self.rx = None;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.rx = None;
                false
            }
        }
    }
}
