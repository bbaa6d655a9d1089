//! The immutable machine state-change event and the scripted steps that
//! produce it.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::enums::MachineState;
use crate::ids::MachineId;

/// One state-change event reported by a machine.
///
/// Fields are private: an event is never mutated after construction. It is
/// moved from the producer into the dispatcher and dropped once its
/// processing resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStateEvent {
    machine_id: MachineId,
    state: MachineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_state: Option<String>,
    /// Unix epoch milliseconds at emission.
    timestamp: i64,
}

impl MachineStateEvent {
    /// Create an event stamped with the current time.
    pub fn new(machine_id: MachineId, state: MachineState, sub_state: Option<String>) -> Self {
        Self::with_timestamp(machine_id, state, sub_state, Utc::now().timestamp_millis())
    }

    /// Create an event with an explicit timestamp.
    pub const fn with_timestamp(
        machine_id: MachineId,
        state: MachineState,
        sub_state: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            machine_id,
            state,
            sub_state,
            timestamp,
        }
    }

    /// Create an event for `machine_id` from one step of its sequence.
    pub fn from_step(machine_id: MachineId, step: &StateStep) -> Self {
        Self::new(machine_id, step.state, step.substate.clone())
    }

    /// The machine that emitted this event.
    pub const fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// The reported state.
    pub const fn state(&self) -> MachineState {
        self.state
    }

    /// Optional free-form sub-state (e.g. `"Production"`).
    pub fn sub_state(&self) -> Option<&str> {
        self.sub_state.as_deref()
    }

    /// Emission time in Unix epoch milliseconds.
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// One entry in a machine's scripted state sequence.
///
/// The producer emits an event for the step, then waits `duration_ms`
/// before emitting the next step for the same machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStep {
    /// State to report.
    pub state: MachineState,
    /// Optional sub-state to report.
    #[serde(default)]
    pub substate: Option<String>,
    /// How long the machine stays in this state before the next step.
    pub duration_ms: u64,
}

impl StateStep {
    /// Create a step.
    pub fn new(state: MachineState, substate: Option<&str>, duration_ms: u64) -> Self {
        Self {
            state,
            substate: substate.map(str::to_owned),
            duration_ms,
        }
    }

    /// Time spent in this step.
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// The standard four-step cycle: load, produce, tool breakage, idle.
    pub fn default_sequence() -> Vec<Self> {
        vec![
            Self::new(MachineState::Cycling, Some("Chargement"), 5000),
            Self::new(MachineState::Cycling, Some("Production"), 5000),
            Self::new(MachineState::Alarm, Some("Casse outil"), 5000),
            Self::new(MachineState::Idle, None, 5000),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_step_copies_state_and_substate() {
        let step = StateStep::new(MachineState::Alarm, Some("Casse outil"), 10);
        let before = Utc::now().timestamp_millis();
        let event = MachineStateEvent::from_step(MachineId::indexed(3), &step);

        assert_eq!(event.machine_id().as_str(), "machine-3");
        assert_eq!(event.state(), MachineState::Alarm);
        assert_eq!(event.sub_state(), Some("Casse outil"));
        assert!(event.timestamp() >= before);
    }

    #[test]
    fn default_sequence_matches_cycle() {
        let seq = StateStep::default_sequence();
        let states: Vec<_> = seq.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                MachineState::Cycling,
                MachineState::Cycling,
                MachineState::Alarm,
                MachineState::Idle,
            ]
        );
        assert!(seq.iter().all(|s| s.duration() == Duration::from_secs(5)));
        assert_eq!(seq.last().and_then(|s| s.substate.as_deref()), None);
    }

    #[test]
    fn event_json_omits_missing_sub_state() {
        let event = MachineStateEvent::with_timestamp(
            MachineId::new("m").unwrap(),
            MachineState::Idle,
            None,
            1_700_000_000_000,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "machine_id": "m",
                "state": "IDLE",
                "timestamp": 1_700_000_000_000_i64
            })
        );
        let back: MachineStateEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn step_parses_without_substate() {
        let step: StateStep =
            serde_json::from_str(r#"{"state": "DOWN", "duration_ms": 250}"#).unwrap();
        assert_eq!(step.state, MachineState::Down);
        assert!(step.substate.is_none());
        assert_eq!(step.duration(), Duration::from_millis(250));
    }
}
