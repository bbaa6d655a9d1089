//! Error types for the simulation binary.
//!
//! [`SimError`] wraps every failure mode of startup and the run so `main`
//! can propagate with `?`.

use machstate_core::config::ConfigError;
use machstate_core::dispatcher::DispatchError;

/// Top-level error for the simulation binary.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The dispatcher could not start or rejected input.
    #[error("dispatch error: {source}")]
    Dispatch {
        /// The underlying dispatch error.
        #[from]
        source: DispatchError,
    },
}
