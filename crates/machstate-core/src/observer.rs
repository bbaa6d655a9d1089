//! Observer hooks for dispatch progress.
//!
//! The dispatcher reports every processing start, success, failure, and the
//! final completion to a [`DispatchObserver`]. All hooks default to no-ops.
//! [`TracingObserver`] logs each hook through `tracing`.

use std::sync::Arc;
use std::time::Duration;

use machstate_types::MachineStateEvent;
use tracing::{info, warn};

use crate::processor::ProcessingError;

/// Final tally of a dispatcher run, produced once at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Events accepted by the dispatcher.
    pub submitted: u64,
    /// Events whose processing succeeded.
    pub succeeded: u64,
    /// Events whose processing failed.
    pub failed: u64,
    /// Distinct machines that submitted at least one event.
    pub machines: usize,
    /// Time from dispatcher start to completion.
    pub elapsed: Duration,
}

/// Receives dispatch progress notifications.
///
/// Hooks are called from the machine's drain task, synchronously with
/// respect to that machine: `on_failed` for an event returns before the
/// next event of the same machine is handed to the processor.
pub trait DispatchObserver: Send + Sync + 'static {
    /// An event is about to be handed to the processor.
    fn on_started(&self, _event: &MachineStateEvent) {}

    /// An event was processed successfully.
    fn on_succeeded(&self, _event: &MachineStateEvent, _elapsed: Duration) {}

    /// An event's processing failed.
    fn on_failed(&self, _event: &MachineStateEvent, _error: &ProcessingError) {}

    /// Every submitted event has resolved and input is closed.
    fn on_complete(&self, _summary: &RunSummary) {}
}

impl<O: DispatchObserver> DispatchObserver for Arc<O> {
    fn on_started(&self, event: &MachineStateEvent) {
        O::on_started(self, event);
    }

    fn on_succeeded(&self, event: &MachineStateEvent, elapsed: Duration) {
        O::on_succeeded(self, event, elapsed);
    }

    fn on_failed(&self, event: &MachineStateEvent, error: &ProcessingError) {
        O::on_failed(self, event, error);
    }

    fn on_complete(&self, summary: &RunSummary) {
        O::on_complete(self, summary);
    }
}

/// An observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl DispatchObserver for NoOpObserver {}

/// Logs dispatch progress with structured `tracing` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_started(&self, event: &MachineStateEvent) {
        info!(
            machine_id = %event.machine_id(),
            state = %event.state(),
            sub_state = event.sub_state(),
            timestamp = event.timestamp(),
            "Starting processing event"
        );
    }

    fn on_succeeded(&self, event: &MachineStateEvent, elapsed: Duration) {
        info!(
            machine_id = %event.machine_id(),
            state = %event.state(),
            sub_state = event.sub_state(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Event processed successfully"
        );
    }

    fn on_failed(&self, event: &MachineStateEvent, error: &ProcessingError) {
        warn!(
            machine_id = %event.machine_id(),
            state = %event.state(),
            sub_state = event.sub_state(),
            error = %error,
            "Error processing event"
        );
    }

    fn on_complete(&self, summary: &RunSummary) {
        info!(
            submitted = summary.submitted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            machines = summary.machines,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "All events have been processed"
        );
    }
}
