//! Grouped-concurrency dispatcher.
//!
//! [`Dispatcher`] partitions an unbounded stream of events by machine. Each
//! machine owns a FIFO queue and a busy flag; at most one of its events is
//! in flight at a time. Distinct machines never wait on each other, so the
//! number of concurrent processor invocations equals the number of machines
//! with work in progress.
//!
//! # Drain tasks
//!
//! When an event arrives for an idle machine, the dispatcher marks the
//! machine busy and spawns one lightweight task for it. That task invokes
//! the processor, reports the outcome, then pops the next pending event for
//! the same machine and repeats. When the queue is empty it marks the
//! machine idle and exits; the next submission spawns a fresh task.
//!
//! All queue mutations (enqueue, dequeue, busy flag) happen under one
//! mutex that is never held across an await point. The processor call is
//! the only suspension point.
//!
//! # Failure isolation
//!
//! A [`ProcessingError`], or a panic inside the processor future, is
//! reported to the [`DispatchObserver`] and then treated exactly like a
//! success for queue advancement. A panicking observer hook is logged and
//! otherwise ignored.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use futures::FutureExt as _;
use machstate_types::{MachineId, MachineStateEvent};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::completion::{CompletionCounts, CompletionTracker};
use crate::observer::{DispatchObserver, RunSummary};
use crate::processor::{ProcessingError, Processor};

/// Errors returned by the dispatcher's lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// [`Dispatcher::start`] was called outside a tokio runtime.
    #[error("dispatcher requires a tokio runtime: {source}")]
    NoRuntime {
        /// The underlying runtime lookup error.
        #[from]
        source: tokio::runtime::TryCurrentError,
    },

    /// An event was submitted after [`Dispatcher::finish_input`].
    #[error("input is closed, event for machine \"{machine_id}\" rejected")]
    InputClosed {
        /// Machine of the rejected event.
        machine_id: MachineId,
    },
}

/// Point-in-time view of dispatcher activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events accepted.
    pub submitted: u64,
    /// Events resolved (success or failure).
    pub resolved: u64,
    /// Events processed successfully.
    pub succeeded: u64,
    /// Events whose processing failed.
    pub failed: u64,
    /// Machines with an event currently handed to the processor.
    pub in_flight: usize,
    /// Events waiting behind an in-flight event of the same machine.
    pub queued: usize,
    /// Distinct machines seen.
    pub machines: usize,
}

/// Pending events for one machine.
///
/// Invariant: `pending` is empty whenever `busy` is false.
#[derive(Debug, Default)]
struct MachineQueue {
    pending: VecDeque<MachineStateEvent>,
    busy: bool,
}

/// State shared between the dispatcher handle and its drain tasks.
struct Shared<P, O> {
    processor: P,
    observer: O,
    runtime: Handle,
    queues: Mutex<HashMap<MachineId, MachineQueue>>,
    tracker: CompletionTracker,
    succeeded: AtomicU64,
    failed: AtomicU64,
    started_at: Instant,
    summary: OnceLock<RunSummary>,
}

/// Routes events into per-machine queues and drives the processor.
///
/// Cloning is cheap and yields another handle to the same dispatcher, so
/// any number of producers may submit concurrently.
pub struct Dispatcher<P, O> {
    shared: Arc<Shared<P, O>>,
}

impl<P, O> Clone for Dispatcher<P, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Processor, O: DispatchObserver> Dispatcher<P, O> {
    /// Start a dispatcher on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoRuntime`] when called outside a runtime.
    pub fn start(processor: P, observer: O) -> Result<Self, DispatchError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(processor, observer, runtime))
    }

    /// Start a dispatcher that spawns its drain tasks on `runtime`.
    pub fn with_runtime(processor: P, observer: O, runtime: Handle) -> Self {
        debug!("Dispatcher started");
        Self {
            shared: Arc::new(Shared {
                processor,
                observer,
                runtime,
                queues: Mutex::new(HashMap::new()),
                tracker: CompletionTracker::new(),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                started_at: Instant::now(),
                summary: OnceLock::new(),
            }),
        }
    }

    /// Accept one event for processing.
    ///
    /// Never blocks on processing: the event is either handed to a new
    /// drain task (idle machine) or appended to its machine's queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InputClosed`] if [`finish_input`] has
    /// already been called.
    ///
    /// [`finish_input`]: Self::finish_input
    pub fn submit(&self, event: MachineStateEvent) -> Result<(), DispatchError> {
        let ready = {
            let mut queues = self.shared.lock_queues();
            if self.shared.tracker.is_producer_done() {
                return Err(DispatchError::InputClosed {
                    machine_id: event.machine_id().clone(),
                });
            }
            self.shared.tracker.record_submitted();

            let queue = queues
                .entry(event.machine_id().clone())
                .or_insert_with(|| {
                    debug!(machine_id = %event.machine_id(), "New machine queue");
                    MachineQueue::default()
                });
            if queue.busy {
                trace!(
                    machine_id = %event.machine_id(),
                    queued = queue.pending.len(),
                    "Machine busy, event queued"
                );
                queue.pending.push_back(event);
                None
            } else {
                queue.busy = true;
                Some(event)
            }
        };

        if let Some(event) = ready {
            self.shared
                .runtime
                .spawn(drain_machine(Arc::clone(&self.shared), event));
        }
        Ok(())
    }

    /// Signal that no further events will be submitted.
    ///
    /// Idempotent. Completion fires once every event submitted before this
    /// call has resolved (immediately, if they all already have).
    pub fn finish_input(&self) {
        let completed = {
            // Held so a concurrent `submit` cannot slip in between its
            // closed-check and its counter increment.
            let _queues = self.shared.lock_queues();
            self.shared.tracker.record_producer_done()
        };
        debug!("Dispatcher input closed");
        if completed {
            self.shared.complete();
        }
    }

    /// Wait until every submitted event has resolved and input is closed.
    ///
    /// Any number of callers may wait; all receive the same summary.
    pub async fn await_completion(&self) -> RunSummary {
        self.shared.tracker.wait().await;
        self.shared.summary()
    }

    /// Close input and wait for completion.
    pub async fn drain(&self) -> RunSummary {
        self.finish_input();
        self.await_completion().await
    }

    /// Whether the run has completed.
    pub fn is_complete(&self) -> bool {
        self.shared.tracker.is_done()
    }

    /// Whether input has been closed.
    pub fn is_input_closed(&self) -> bool {
        self.shared.tracker.is_producer_done()
    }

    /// Snapshot of the completion counters.
    pub fn counts(&self) -> CompletionCounts {
        self.shared.tracker.counts()
    }

    /// Snapshot of dispatcher activity.
    pub fn stats(&self) -> DispatchStats {
        let queues = self.shared.lock_queues();
        let counts = self.shared.tracker.counts();
        DispatchStats {
            submitted: counts.submitted,
            resolved: counts.resolved,
            succeeded: self.shared.succeeded.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            in_flight: queues.values().filter(|q| q.busy).count(),
            queued: queues.values().map(|q| q.pending.len()).sum(),
            machines: queues.len(),
        }
    }
}

impl<P: Processor, O: DispatchObserver> Shared<P, O> {
    fn lock_queues(&self) -> MutexGuard<'_, HashMap<MachineId, MachineQueue>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock is still safe to use.
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke the processor for one event and report the outcome.
    async fn invoke(&self, event: &MachineStateEvent) {
        self.observe("on_started", Some(event.machine_id()), |o| o.on_started(event));
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.processor.process(event))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ProcessingError::Panicked {
                    machine_id: event.machine_id().clone(),
                    message: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                let elapsed = started.elapsed();
                self.observe("on_succeeded", Some(event.machine_id()), |o| {
                    o.on_succeeded(event, elapsed);
                });
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.observe("on_failed", Some(event.machine_id()), |o| {
                    o.on_failed(event, &error);
                });
            }
        }
    }

    /// Advance `machine_id`'s queue after one of its events resolved.
    ///
    /// Returns the next event to process, or `None` after marking the
    /// machine idle.
    fn on_resolved(&self, machine_id: &MachineId) -> Option<MachineStateEvent> {
        let next = {
            let mut queues = self.lock_queues();
            queues.get_mut(machine_id).and_then(|queue| {
                let next = queue.pending.pop_front();
                queue.busy = next.is_some();
                next
            })
        };
        if next.is_none() {
            trace!(machine_id = %machine_id, "Machine queue idle");
        }

        // Counted after the queue update: if a next event exists it is
        // still unresolved, so completion cannot fire early.
        if self.tracker.record_resolved() {
            self.complete();
        }
        next
    }

    fn summary(&self) -> RunSummary {
        *self.summary.get_or_init(|| {
            let machines = self.lock_queues().len();
            RunSummary {
                submitted: self.tracker.counts().submitted,
                succeeded: self.succeeded.load(Ordering::SeqCst),
                failed: self.failed.load(Ordering::SeqCst),
                machines,
                elapsed: self.started_at.elapsed(),
            }
        })
    }

    fn complete(&self) {
        let summary = self.summary();
        debug!(
            submitted = summary.submitted,
            machines = summary.machines,
            "Dispatcher completed"
        );
        self.observe("on_complete", None, |o| o.on_complete(&summary));
    }

    /// Run one observer hook, containing any panic it raises.
    fn observe(&self, hook: &'static str, machine_id: Option<&MachineId>, call: impl FnOnce(&O)) {
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| call(&self.observer))) {
            warn!(
                hook,
                machine_id = machine_id.map(MachineId::as_str),
                panic = %panic_message(payload.as_ref()),
                "Observer hook panicked"
            );
        }
    }
}

/// Process `event` and then every event queued behind it for the same
/// machine, exiting once the queue is empty.
async fn drain_machine<P: Processor, O: DispatchObserver>(
    shared: Arc<Shared<P, O>>,
    mut event: MachineStateEvent,
) {
    loop {
        shared.invoke(&event).await;
        match shared.on_resolved(event.machine_id()) {
            Some(next) => event = next,
            None => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
