//! Grouped-concurrency dispatch for machine state-change events.
//!
//! Events are partitioned by machine: each machine's events are processed
//! strictly in arrival order, one at a time, while different machines are
//! processed concurrently with no ordering between them. A per-event
//! processing failure is reported and isolated to that event.
//!
//! # Modules
//!
//! - [`completion`] -- Submitted/resolved counters and the one-shot
//!   completion signal.
//! - [`config`] -- Configuration loading from `machstate-config.yaml` into
//!   strongly-typed structs.
//! - [`dispatcher`] -- [`Dispatcher`]: per-machine queues and the drain
//!   tasks that drive the processor.
//! - [`observer`] -- [`DispatchObserver`] hooks and the `tracing` reporter.
//! - [`processor`] -- [`Processor`] trait, [`StubProcessor`], and the
//!   [`WithTimeout`] wrapper.
//! - [`producer`] -- Paced per-machine event emission.
//!
//! [`Dispatcher`]: dispatcher::Dispatcher
//! [`DispatchObserver`]: observer::DispatchObserver
//! [`Processor`]: processor::Processor
//! [`StubProcessor`]: processor::StubProcessor
//! [`WithTimeout`]: processor::WithTimeout

pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod observer;
pub mod processor;
pub mod producer;
