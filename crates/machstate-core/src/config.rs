//! Configuration loading and typed config structures.
//!
//! The configuration lives in `machstate-config.yaml`. Every section and
//! field has a default, so an empty or partial file is valid. Environment
//! variables override individual values after parsing:
//!
//! - `MACHINE_COUNT` overrides `machines.count`
//! - `PROCESSING_DURATION_MS` overrides `processing.duration_ms`
//! - `FAILURE_PROBABILITY` overrides `processing.failure_probability`
//! - `PROCESSING_TIMEOUT_MS` overrides `processing.timeout_ms`
//! - `LOG_LEVEL` overrides `logging.level`

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use machstate_types::StateStep;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range, or an override did not parse.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Which machines emit and what they emit.
    #[serde(default)]
    pub machines: MachinesConfig,

    /// Simulated processing behaviour.
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// Environment variables are not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is malformed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, then re-validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is malformed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(count) = parse_override(&lookup, "MACHINE_COUNT")? {
            self.machines.count = count;
        }
        if let Some(ms) = parse_override(&lookup, "PROCESSING_DURATION_MS")? {
            self.processing.duration_ms = ms;
        }
        if let Some(p) = parse_override(&lookup, "FAILURE_PROBABILITY")? {
            self.processing.failure_probability = p;
        }
        if let Some(ms) = parse_override(&lookup, "PROCESSING_TIMEOUT_MS")? {
            self.processing.timeout_ms = Some(ms);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        self.validate()
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.processing.failure_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::Invalid {
                message: format!("processing.failure_probability must be within [0, 1], got {p}"),
            });
        }
        if self.processing.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                message: "processing.timeout_ms must be positive when set".to_owned(),
            });
        }
        Ok(())
    }
}

/// Machine population and the state sequence each machine replays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MachinesConfig {
    /// Number of machines, named `machine-0` through `machine-{count-1}`.
    #[serde(default = "default_machine_count")]
    pub count: usize,

    /// Ordered steps every machine emits.
    #[serde(default = "StateStep::default_sequence")]
    pub sequence: Vec<StateStep>,
}

impl Default for MachinesConfig {
    fn default() -> Self {
        Self {
            count: default_machine_count(),
            sequence: StateStep::default_sequence(),
        }
    }
}

/// Simulated processor behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingConfig {
    /// Time each event takes to process.
    #[serde(default = "default_processing_duration_ms")]
    pub duration_ms: u64,

    /// Probability in `[0, 1]` that processing an event fails.
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,

    /// Optional per-event deadline.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Seed for the failure RNG; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ProcessingConfig {
    /// Processing latency.
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Per-event deadline, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_processing_duration_ms(),
            failure_probability: default_failure_probability(),
            timeout_ms: None,
            seed: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn parse_override<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                message: format!("invalid {name}={raw:?}: {e}"),
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_machine_count() -> usize {
    300
}

const fn default_processing_duration_ms() -> u64 {
    10_000
}

const fn default_failure_probability() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use machstate_types::MachineState;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_standard_run() {
        let config = SimulationConfig::default();
        assert_eq!(config.machines.count, 300);
        assert_eq!(config.machines.sequence.len(), 4);
        assert_eq!(config.processing.duration(), Duration::from_secs(10));
        assert!((config.processing.failure_probability - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.processing.timeout(), None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
machines:
  count: 3
  sequence:
    - state: CYCLING
      substate: "Production"
      duration_ms: 100
    - state: DOWN
      duration_ms: 50

processing:
  duration_ms: 20
  failure_probability: 0.5
  timeout_ms: 1000
  seed: 9

logging:
  level: "debug"
  json: true
"#;
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.machines.count, 3);
        assert_eq!(
            config.machines.sequence,
            vec![
                StateStep::new(MachineState::Cycling, Some("Production"), 100),
                StateStep::new(MachineState::Down, None, 50),
            ]
        );
        assert_eq!(config.processing.duration_ms, 20);
        assert_eq!(config.processing.timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.processing.seed, Some(9));
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = SimulationConfig::parse("machines:\n  count: 7\n").unwrap();
        assert_eq!(config.machines.count, 7);
        // Everything else uses defaults
        assert_eq!(config.machines.sequence, StateStep::default_sequence());
        assert_eq!(config.processing.duration_ms, 10_000);
    }

    #[test]
    fn parse_empty_yaml() {
        assert_eq!(
            SimulationConfig::parse("").unwrap(),
            SimulationConfig::default()
        );
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let err = SimulationConfig::parse("processing:\n  failure_probability: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = SimulationConfig::parse("processing:\n  timeout_ms: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = SimulationConfig::parse("machines: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = SimulationConfig::default();
        config
            .apply_overrides(env(&[
                ("MACHINE_COUNT", "12"),
                ("PROCESSING_DURATION_MS", "0"),
                ("FAILURE_PROBABILITY", "0.25"),
                ("PROCESSING_TIMEOUT_MS", "500"),
                ("LOG_LEVEL", "warn"),
            ]))
            .unwrap();
        assert_eq!(config.machines.count, 12);
        assert_eq!(config.processing.duration_ms, 0);
        assert!((config.processing.failure_probability - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.processing.timeout_ms, Some(500));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut config = SimulationConfig::default();
        let err = config
            .apply_overrides(env(&[("MACHINE_COUNT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("MACHINE_COUNT"));
        assert_eq!(config.machines.count, 300);
    }

    #[test]
    fn override_probability_is_validated() {
        let mut config = SimulationConfig::default();
        let err = config
            .apply_overrides(env(&[("FAILURE_PROBABILITY", "-0.1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("machstate-config.yaml");
        if path.exists() {
            let contents = std::fs::read_to_string(&path).unwrap();
            let config = SimulationConfig::parse(&contents);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
