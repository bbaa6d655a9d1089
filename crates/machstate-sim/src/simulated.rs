//! Simulated event processor.
//!
//! Stands in for real downstream work: each event takes a fixed amount of
//! time and fails with a configured probability. The outcome is drawn when
//! processing starts; the failure is reported once the latency has elapsed.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use machstate_core::config::ProcessingConfig;
use machstate_core::processor::{ProcessingError, Processor};
use machstate_types::MachineStateEvent;
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

/// Processor with fixed latency and random failures.
#[derive(Debug)]
pub struct SimulatedProcessor {
    duration: Duration,
    failure_probability: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedProcessor {
    /// Build from the `processing` configuration section.
    ///
    /// A configured seed makes the failure pattern reproducible. A
    /// non-finite probability is treated as zero.
    pub fn new(config: &ProcessingConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let failure_probability = if config.failure_probability.is_finite() {
            config.failure_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            duration: config.duration(),
            failure_probability,
            rng: Mutex::new(rng),
        }
    }

    fn should_fail(&self) -> bool {
        if self.failure_probability <= 0.0 {
            return false;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_bool(self.failure_probability)
    }
}

impl Processor for SimulatedProcessor {
    async fn process(&self, event: &MachineStateEvent) -> Result<(), ProcessingError> {
        let fail = self.should_fail();
        tokio::time::sleep(self.duration).await;
        if fail {
            Err(ProcessingError::failed(event, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use machstate_types::{MachineId, MachineState};
    use tokio::time::Instant;

    use super::*;

    fn config(failure_probability: f64, seed: Option<u64>) -> ProcessingConfig {
        ProcessingConfig {
            duration_ms: 250,
            failure_probability,
            timeout_ms: None,
            seed,
        }
    }

    fn event() -> MachineStateEvent {
        MachineStateEvent::with_timestamp(MachineId::indexed(0), MachineState::Idle, None, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn waits_configured_latency() {
        let processor = SimulatedProcessor::new(&config(0.0, None));
        let started = Instant::now();
        processor.process(&event()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn certain_failure_always_fails() {
        let processor = SimulatedProcessor::new(&config(1.0, Some(1)));
        for _ in 0..5 {
            let err = processor.process(&event()).await.unwrap_err();
            assert!(matches!(err, ProcessingError::Failed { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_probability_never_fails() {
        for probability in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let processor = SimulatedProcessor::new(&config(probability, Some(3)));
            for _ in 0..5 {
                assert!(processor.process(&event()).await.is_ok());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_outcomes() {
        let a = SimulatedProcessor::new(&config(0.5, Some(7)));
        let b = SimulatedProcessor::new(&config(0.5, Some(7)));
        let mut outcomes_a = Vec::new();
        let mut outcomes_b = Vec::new();
        for _ in 0..20 {
            outcomes_a.push(a.process(&event()).await.is_ok());
            outcomes_b.push(b.process(&event()).await.is_ok());
        }
        assert_eq!(outcomes_a, outcomes_b);
    }
}
