//! Completion tracking: submitted vs. resolved counts and the one-shot
//! "all work complete" signal.
//!
//! The tracker moves from [`CompletionState::Running`] to
//! [`CompletionState::Done`] the instant both of these hold:
//!
//! - the producer has signalled that no more events will be submitted, and
//! - every submitted event has resolved (success or failure).
//!
//! The condition is evaluated after every resolution and after the
//! producer-done signal, so whichever of the two happens last performs the
//! transition. `Done` is terminal.
//!
//! Counters are atomics so many machines can resolve concurrently without
//! lost updates. All operations use `SeqCst`: a resolution racing the
//! producer-done signal always has at least one side observe both writes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Events may still be submitted or are still in flight.
    Running,
    /// Every event has resolved and the producer is done.
    Done,
}

/// Point-in-time copy of the tracker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCounts {
    /// Events accepted by the dispatcher.
    pub submitted: u64,
    /// Events whose processing resolved.
    pub resolved: u64,
    /// Whether the producer has signalled end of input.
    pub producer_done: bool,
}

/// Counts submissions and resolutions and fires completion exactly once.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    submitted: AtomicU64,
    resolved: AtomicU64,
    producer_done: AtomicBool,
    done: AtomicBool,
    notify: Notify,
}

impl CompletionTracker {
    /// Create a tracker in the `Running` state with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted event.
    ///
    /// Must not be called after [`record_producer_done`]; the dispatcher
    /// rejects late submissions before they reach the tracker.
    ///
    /// [`record_producer_done`]: Self::record_producer_done
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one resolved event.
    ///
    /// Returns `true` if this call completed the run.
    pub fn record_resolved(&self) -> bool {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        self.try_complete()
    }

    /// Record that the producer will submit nothing further.
    ///
    /// Idempotent. Returns `true` if this call completed the run, which
    /// happens when every submitted event had already resolved.
    pub fn record_producer_done(&self) -> bool {
        self.producer_done.store(true, Ordering::SeqCst);
        self.try_complete()
    }

    /// Whether the producer-done signal has been recorded.
    pub fn is_producer_done(&self) -> bool {
        self.producer_done.load(Ordering::SeqCst)
    }

    /// Whether the run has completed.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CompletionState {
        if self.is_done() {
            CompletionState::Done
        } else {
            CompletionState::Running
        }
    }

    /// Snapshot of the counters.
    pub fn counts(&self) -> CompletionCounts {
        // Resolved is read first: both only grow, so the snapshot never
        // shows more resolutions than submissions.
        let resolved = self.resolved.load(Ordering::SeqCst);
        let submitted = self.submitted.load(Ordering::SeqCst);
        CompletionCounts {
            submitted,
            resolved,
            producer_done: self.is_producer_done(),
        }
    }

    /// Wait until the run has completed.
    ///
    /// Returns immediately if it already has. Any number of tasks may wait.
    pub async fn wait(&self) {
        loop {
            // Registered before the check so a transition in between is
            // still delivered by `notify_waiters`.
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    fn try_complete(&self) -> bool {
        if !self.is_producer_done() {
            return false;
        }
        let counts = self.counts();
        if counts.resolved != counts.submitted {
            return false;
        }
        if self
            .done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.notify.notify_waiters();
        true
    }
}
