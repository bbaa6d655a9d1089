//! Paced per-machine event emission.
//!
//! The [`Producer`] replays a fixed state sequence for every machine. Each
//! machine emits its next step only after the previous step's duration has
//! elapsed; machines run concurrently and independently. After the last
//! event of the last machine is submitted, the producer closes the
//! dispatcher's input exactly once. It never waits for processing.

use futures::future::join_all;
use machstate_types::{MachineId, MachineStateEvent, StateStep};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::MachinesConfig;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::observer::DispatchObserver;
use crate::processor::Processor;

/// Outcome of a producer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    /// Number of machines that emitted their sequence.
    pub machines: usize,
    /// Total events submitted.
    pub events_submitted: u64,
    /// Time from the first submission to the input-closed signal.
    pub elapsed: Duration,
}

/// Emits a scripted state sequence for a set of machines.
#[derive(Debug, Clone)]
pub struct Producer {
    machines: Vec<MachineId>,
    sequence: Vec<StateStep>,
}

impl Producer {
    /// Producer for `machine_count` machines named `machine-0..`.
    pub fn new(machine_count: usize, sequence: Vec<StateStep>) -> Self {
        Self::with_machines((0..machine_count).map(MachineId::indexed).collect(), sequence)
    }

    /// Producer for an explicit list of machines.
    pub const fn with_machines(machines: Vec<MachineId>, sequence: Vec<StateStep>) -> Self {
        Self { machines, sequence }
    }

    /// Producer built from the `machines` configuration section.
    pub fn from_config(config: &MachinesConfig) -> Self {
        Self::new(config.count, config.sequence.clone())
    }

    /// Machines this producer emits for.
    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }

    /// Total number of events a full run submits.
    pub fn expected_events(&self) -> u64 {
        let machines = u64::try_from(self.machines.len()).unwrap_or(u64::MAX);
        let steps = u64::try_from(self.sequence.len()).unwrap_or(u64::MAX);
        machines.saturating_mul(steps)
    }

    /// Emit every machine's sequence into `dispatcher`, then close its input.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InputClosed`] if the dispatcher's input was
    /// closed by someone else while the producer was still emitting.
    pub async fn run<P: Processor, O: DispatchObserver>(
        &self,
        dispatcher: &Dispatcher<P, O>,
    ) -> Result<ProducerReport, DispatchError> {
        let started = Instant::now();
        info!(
            machines = self.machines.len(),
            steps = self.sequence.len(),
            expected_events = self.expected_events(),
            "Producer starting"
        );

        let emitters = self
            .machines
            .iter()
            .map(|machine_id| self.emit_machine(dispatcher, machine_id));
        let mut events_submitted: u64 = 0;
        for sent in join_all(emitters).await {
            events_submitted = events_submitted.saturating_add(sent?);
        }

        dispatcher.finish_input();
        let report = ProducerReport {
            machines: self.machines.len(),
            events_submitted,
            elapsed: started.elapsed(),
        };
        info!(
            events_submitted = report.events_submitted,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "All machine state events sent"
        );
        Ok(report)
    }

    async fn emit_machine<P: Processor, O: DispatchObserver>(
        &self,
        dispatcher: &Dispatcher<P, O>,
        machine_id: &MachineId,
    ) -> Result<u64, DispatchError> {
        let mut sent: u64 = 0;
        let mut steps = self.sequence.iter().enumerate().peekable();
        while let Some((index, step)) = steps.next() {
            dispatcher.submit(MachineStateEvent::from_step(machine_id.clone(), step))?;
            sent = sent.saturating_add(1);
            debug!(
                machine_id = %machine_id,
                step = index,
                state = %step.state,
                "Event sent"
            );

            // No wait after the final step.
            if steps.peek().is_some() {
                tokio::time::sleep(step.duration()).await;
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use machstate_types::MachineState;

    use super::*;
    use crate::observer::NoOpObserver;
    use crate::processor::{ProcessingError, StubProcessor};

    /// Records when each event reached the processor.
    struct Arrivals {
        origin: Instant,
        seen: Mutex<Vec<(MachineId, MachineState, Duration)>>,
    }

    impl Processor for Arrivals {
        async fn process(&self, event: &MachineStateEvent) -> Result<(), ProcessingError> {
            self.seen.lock().unwrap().push((
                event.machine_id().clone(),
                event.state(),
                self.origin.elapsed(),
            ));
            Ok(())
        }
    }

    fn steps(ms: u64) -> Vec<StateStep> {
        vec![
            StateStep::new(MachineState::Cycling, Some("Chargement"), ms),
            StateStep::new(MachineState::Alarm, None, ms),
            StateStep::new(MachineState::Idle, None, ms),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn paces_each_machine_by_step_duration() {
        let arrivals = Arc::new(Arrivals {
            origin: Instant::now(),
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::start(Arc::clone(&arrivals), NoOpObserver).unwrap();
        let producer = Producer::new(2, steps(5000));

        let report = producer.run(&dispatcher).await.unwrap();
        assert_eq!(report.events_submitted, 6);
        assert_eq!(report.machines, 2);
        // Two waits of 5s; none after the last step.
        assert_eq!(report.elapsed.as_secs(), 10);

        let summary = dispatcher.await_completion().await;
        assert_eq!(summary.succeeded, 6);

        let seen = arrivals.seen.lock().unwrap().clone();
        for machine in [MachineId::indexed(0), MachineId::indexed(1)] {
            let offsets: Vec<_> = seen
                .iter()
                .filter(|(id, _, _)| *id == machine)
                .map(|(_, _, at)| at.as_secs())
                .collect();
            assert_eq!(offsets, vec![0, 5, 10]);
        }
    }

    #[tokio::test]
    async fn closes_input_when_done() {
        let dispatcher = Dispatcher::start(StubProcessor::new(), NoOpObserver).unwrap();
        let producer = Producer::new(3, steps(0));
        assert_eq!(producer.expected_events(), 9);

        producer.run(&dispatcher).await.unwrap();
        assert!(dispatcher.is_input_closed());
        assert_eq!(dispatcher.await_completion().await.submitted, 9);
    }

    #[tokio::test]
    async fn zero_machines_completes_immediately() {
        let dispatcher = Dispatcher::start(StubProcessor::new(), NoOpObserver).unwrap();
        let report = Producer::new(0, steps(1000)).run(&dispatcher).await.unwrap();
        assert_eq!(report.events_submitted, 0);
        assert!(dispatcher.is_complete());
    }

    #[tokio::test]
    async fn fails_when_input_closed_externally() {
        let dispatcher = Dispatcher::start(StubProcessor::new(), NoOpObserver).unwrap();
        dispatcher.finish_input();
        let err = Producer::new(1, steps(0)).run(&dispatcher).await.unwrap_err();
        assert!(matches!(err, DispatchError::InputClosed { .. }));
    }

    #[test]
    fn custom_machine_ids_are_kept() {
        let ids = vec![
            MachineId::new("lathe").unwrap(),
            MachineId::new("press").unwrap(),
        ];
        let producer = Producer::with_machines(ids.clone(), steps(0));
        assert_eq!(producer.machines(), ids.as_slice());
    }
}
