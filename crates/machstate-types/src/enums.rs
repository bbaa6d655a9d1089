//! Enumeration types for machine state-change events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The operating state a machine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// Running a production cycle.
    Cycling,
    /// Powered but not producing.
    Idle,
    /// Stopped on an alarm condition.
    Alarm,
    /// Out of service.
    Down,
}

impl MachineState {
    /// Wire name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cycling => "CYCLING",
            Self::Idle => "IDLE",
            Self::Alarm => "ALARM",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
