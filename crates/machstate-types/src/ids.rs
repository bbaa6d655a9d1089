//! Validated machine identifier.
//!
//! A [`MachineId`] is the grouping key the dispatcher orders by. Empty or
//! whitespace-only identifiers are rejected here, at construction time, so
//! the dispatcher never has to handle malformed keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a machine identifier is empty or whitespace only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid machine id {raw:?}: must contain a non-whitespace character")]
pub struct InvalidMachineId {
    /// The rejected input.
    pub raw: String,
}

/// Identifier of the machine that originated an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineId(String);

impl MachineId {
    /// Create a machine identifier, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMachineId`] if `raw` is empty or only whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidMachineId> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidMachineId { raw });
        }
        Ok(Self(raw))
    }

    /// The conventional `machine-{index}` identifier.
    pub fn indexed(index: usize) -> Self {
        Self(format!("machine-{index}"))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MachineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MachineId {
    type Error = InvalidMachineId;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl TryFrom<&str> for MachineId {
    type Error = InvalidMachineId;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<MachineId> for String {
    fn from(id: MachineId) -> Self {
        id.0
    }
}
