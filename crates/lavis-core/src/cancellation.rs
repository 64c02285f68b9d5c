// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Cooperative cancellation token shared between `TaskOrchestrator` and the
//! `MicroExecutor` instances it drives.
//!
//! The teacher's cancellation primitive (`sven-node::control::service`) is a
//! one-shot `tokio::sync::oneshot::Receiver<()>` checked at loop-iteration
//! boundaries — good for a single check, but `TaskOrchestrator.interrupt()`
//! must be observable at more than one point (between milestones *and*
//! between batched actions within one milestone) and by more than one
//! reader. `tokio_util::sync::CancellationToken` is not in the teacher's
//! dependency set, so this generalizes the same oneshot idea into a
//! multi-reader flag backed by `Arc<AtomicBool>` plus a `tokio::sync::Notify`
//! for wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve immediately if already cancelled, otherwise wait for the next
    /// `cancel()` call. Useful for a `tokio::select!` arm inside a long
    /// suspension point (e.g. a model call) that should bail out early.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
