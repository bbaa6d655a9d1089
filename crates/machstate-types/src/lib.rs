//! Shared type definitions for machine state-change events.
//!
//! This crate is the single source of truth for the values that flow from
//! the producer through the dispatcher into a processor.
//!
//! # Modules
//!
//! - [`ids`] -- Validated machine identifier
//! - [`enums`] -- Machine state enumeration
//! - [`event`] -- The immutable state-change event and scripted state steps

pub mod enums;
pub mod event;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use enums::MachineState;
pub use event::{MachineStateEvent, StateStep};
pub use ids::{InvalidMachineId, MachineId};
