//! Processor trait and provided implementations.
//!
//! The dispatcher invokes a [`Processor`] exactly once per event and waits
//! for it to resolve. It requires only that every invocation eventually
//! resolves. It imposes no deadline of its own; wrap a processor in
//! [`WithTimeout`] when one is wanted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use machstate_types::{MachineId, MachineStateEvent};

/// Failure reported for a single event.
///
/// Recovered at the dispatcher boundary: it is handed to the observer and
/// never stalls the machine's queue or any other machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    /// The processor rejected the event.
    #[error("processing failed for machine \"{machine_id}\": {reason}")]
    Failed {
        /// Machine the event belonged to.
        machine_id: MachineId,
        /// Description of the failure.
        reason: String,
    },

    /// The processor did not resolve within its deadline.
    #[error("processing for machine \"{machine_id}\" exceeded {timeout_ms}ms")]
    Timeout {
        /// Machine the event belonged to.
        machine_id: MachineId,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The processor panicked while handling the event.
    #[error("processor panicked for machine \"{machine_id}\": {message}")]
    Panicked {
        /// Machine the event belonged to.
        machine_id: MachineId,
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl ProcessingError {
    /// Build a [`ProcessingError::Failed`] for `event`.
    pub fn failed(event: &MachineStateEvent, reason: impl Into<String>) -> Self {
        Self::Failed {
            machine_id: event.machine_id().clone(),
            reason: reason.into(),
        }
    }

    /// Machine the failed event belonged to.
    pub const fn machine_id(&self) -> &MachineId {
        match self {
            Self::Failed { machine_id, .. }
            | Self::Timeout { machine_id, .. }
            | Self::Panicked { machine_id, .. } => machine_id,
        }
    }
}

/// An asynchronous, possibly failing operation applied to each event.
///
/// Implementations must be shareable across the dispatcher's drain tasks
/// and must always eventually resolve.
pub trait Processor: Send + Sync + 'static {
    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError`] when the event could not be processed.
    fn process(
        &self,
        event: &MachineStateEvent,
    ) -> impl Future<Output = Result<(), ProcessingError>> + Send;
}

impl<P: Processor> Processor for Arc<P> {
    fn process(
        &self,
        event: &MachineStateEvent,
    ) -> impl Future<Output = Result<(), ProcessingError>> + Send {
        P::process(&**self, event)
    }
}

/// A processor that succeeds immediately for every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubProcessor;

impl StubProcessor {
    /// Create a new stub processor.
    pub const fn new() -> Self {
        Self
    }
}

impl Processor for StubProcessor {
    async fn process(&self, _event: &MachineStateEvent) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// Enforces a deadline on an inner processor.
///
/// An invocation that exceeds the deadline resolves with
/// [`ProcessingError::Timeout`]; the inner future is dropped.
#[derive(Debug, Clone)]
pub struct WithTimeout<P> {
    inner: P,
    timeout: Duration,
}

impl<P: Processor> WithTimeout<P> {
    /// Wrap `inner` with a per-event deadline.
    pub const fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured deadline.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<P: Processor> Processor for WithTimeout<P> {
    async fn process(&self, event: &MachineStateEvent) -> Result<(), ProcessingError> {
        match tokio::time::timeout(self.timeout, self.inner.process(event)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProcessingError::Timeout {
                machine_id: event.machine_id().clone(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
