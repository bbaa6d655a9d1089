//! Machine state simulation entry point.
//!
//! Replays a scripted state sequence for a population of machines through
//! the grouped dispatcher: events of one machine are processed in order,
//! machines are processed concurrently, and failed events are logged
//! without stopping anything else.
//!
//! # Architecture
//!
//! ```text
//! Producer --submit--> Dispatcher --process--> SimulatedProcessor
//!                          |
//!                          +--> TracingObserver (start / success / failure / done)
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `machstate-config.yaml` (or defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Build the simulated processor, optionally with a deadline
//! 4. Start the dispatcher and run the producer
//! 5. Wait for completion and log the summary

mod error;
mod simulated;

use std::path::PathBuf;

use machstate_core::config::{LoggingConfig, SimulationConfig};
use machstate_core::dispatcher::Dispatcher;
use machstate_core::observer::{RunSummary, TracingObserver};
use machstate_core::processor::{Processor, WithTimeout};
use machstate_core::producer::Producer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::SimError;
use crate::simulated::SimulatedProcessor;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "machstate-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration loading or the run fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("machstate-sim starting");
    info!(
        machines = config.machines.count,
        steps = config.machines.sequence.len(),
        processing_duration_ms = config.processing.duration_ms,
        failure_probability = config.processing.failure_probability,
        timeout_ms = config.processing.timeout_ms,
        "Configuration loaded"
    );

    // 3. Build the processor.
    let processor = SimulatedProcessor::new(&config.processing);
    let summary = match config.processing.timeout() {
        Some(timeout) => run(WithTimeout::new(processor, timeout), &config).await?,
        None => run(processor, &config).await?,
    };

    // 5. Log results.
    info!(
        submitted = summary.submitted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        machines = summary.machines,
        elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
        "machstate-sim shutdown complete"
    );
    Ok(())
}

/// Start the dispatcher, emit every machine's sequence, and wait for all
/// events to resolve.
async fn run<P: Processor>(
    processor: P,
    config: &SimulationConfig,
) -> Result<RunSummary, SimError> {
    // 4. Start the dispatcher and run the producer.
    let dispatcher = Dispatcher::start(processor, TracingObserver)?;
    let producer = Producer::from_config(&config.machines);

    let report = producer.run(&dispatcher).await?;
    info!(
        events_submitted = report.events_submitted,
        "Producer finished, waiting for processing to drain"
    );

    Ok(dispatcher.await_completion().await)
}

/// Load configuration from `MACHSTATE_CONFIG` or `machstate-config.yaml`.
///
/// Falls back to defaults (with environment overrides) when the file does
/// not exist.
fn load_config() -> Result<SimulationConfig, SimError> {
    let path = std::env::var_os("MACHSTATE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok(SimulationConfig::from_file(&path)?)
    } else {
        Ok(SimulationConfig::from_env()?)
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
