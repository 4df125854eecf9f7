//! Pipeline configuration.
//!
//! Every field has a default, so a TOML document only needs to name what it
//! changes:
//!
//! ```toml
//! heartbeat_interval_secs = 60
//!
//! [[circuits]]
//! name = "lowercase"
//!
//! [[circuits]]
//! name = "uppercase"
//! on_forward_failure = "hold"
//! conductor = { capacity = 50, slow_threshold = 0.6, stop_threshold = 0.9 }
//! ```

use crate::backpressure::Thresholds;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Default number of items a queue can hold
pub const DEFAULT_CAPACITY: usize = 100;

/// What a circuit does with an item whose forward fill was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardFailure {
    /// Drop the item; the caller saw downstream accepting a moment earlier
    #[default]
    Drop,
    /// Fall back to the local hold queue
    Hold,
}

/// Capacity and thresholds for one queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub slow_threshold: f64,
    pub stop_threshold: f64,
}

impl QueueConfig {
    pub fn new(capacity: usize, slow_threshold: f64, stop_threshold: f64) -> Self {
        Self {
            capacity,
            slow_threshold,
            stop_threshold,
        }
    }

    /// Defaults for a circuit's conductor
    pub fn conductor() -> Self {
        let t = Thresholds::CONDUCTOR;
        Self::new(DEFAULT_CAPACITY, t.slow(), t.stop())
    }

    /// Defaults for a circuit's hold queue
    pub fn hold() -> Self {
        let t = Thresholds::HOLD;
        Self::new(DEFAULT_CAPACITY, t.slow(), t.stop())
    }

    /// Validated thresholds
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.slow_threshold, self.stop_threshold)
    }
}

/// A queue table as written in TOML; absent fields come from a role default
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueueTable {
    capacity: Option<usize>,
    slow_threshold: Option<f64>,
    stop_threshold: Option<f64>,
}

impl QueueTable {
    fn over(self, base: QueueConfig) -> QueueConfig {
        QueueConfig {
            capacity: self.capacity.unwrap_or(base.capacity),
            slow_threshold: self.slow_threshold.unwrap_or(base.slow_threshold),
            stop_threshold: self.stop_threshold.unwrap_or(base.stop_threshold),
        }
    }
}

fn conductor_table<'de, D>(deserializer: D) -> std::result::Result<QueueConfig, D::Error>
where
    D: Deserializer<'de>,
{
    QueueTable::deserialize(deserializer).map(|t| t.over(QueueConfig::conductor()))
}

fn hold_table<'de, D>(deserializer: D) -> std::result::Result<QueueConfig, D::Error>
where
    D: Deserializer<'de>,
{
    QueueTable::deserialize(deserializer).map(|t| t.over(QueueConfig::hold()))
}

/// Settings for a single circuit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CircuitConfig {
    pub name: String,
    #[serde(default = "QueueConfig::conductor", deserialize_with = "conductor_table")]
    pub conductor: QueueConfig,
    #[serde(default = "QueueConfig::hold", deserialize_with = "hold_table")]
    pub hold: QueueConfig,
    #[serde(default)]
    pub on_forward_failure: ForwardFailure,
}

impl CircuitConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conductor: QueueConfig::conductor(),
            hold: QueueConfig::hold(),
            on_forward_failure: ForwardFailure::Drop,
        }
    }

    pub fn with_conductor(mut self, conductor: QueueConfig) -> Self {
        self.conductor = conductor;
        self
    }

    pub fn with_hold(mut self, hold: QueueConfig) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_forward_failure(mut self, policy: ForwardFailure) -> Self {
        self.on_forward_failure = policy;
        self
    }

    /// Check every value without building anything
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "circuit name must not be empty".into(),
            ));
        }
        for (role, queue) in [("conductor", &self.conductor), ("hold", &self.hold)] {
            if queue.capacity == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "circuit '{}' {role} capacity must be positive",
                    self.name
                )));
            }
            queue.thresholds()?;
        }
        Ok(())
    }
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_retry_ms() -> u64 {
    100
}

/// Settings for a whole pipeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub circuits: Vec<CircuitConfig>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// How often a runner retries releasing held items downstream
    #[serde(default = "default_retry_ms")]
    pub retry_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            circuits: Vec::new(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            retry_interval_ms: default_retry_ms(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(contents).map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "heartbeat interval must be positive".into(),
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "retry interval must be positive".into(),
            ));
        }
        for circuit in &self.circuits {
            circuit.validate()?;
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let circuit = CircuitConfig::new("c");
        assert_eq!(circuit.conductor.capacity, 100);
        assert_eq!(circuit.conductor.slow_threshold, 0.75);
        assert_eq!(circuit.hold.slow_threshold, 0.50);
        assert_eq!(circuit.on_forward_failure, ForwardFailure::Drop);
        assert!(circuit.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
            heartbeat_interval_secs = 5

            [[circuits]]
            name = "lowercase"

            [[circuits]]
            name = "uppercase"
            on_forward_failure = "hold"
            conductor = { capacity = 50, slow_threshold = 0.6, stop_threshold = 0.9 }
            "#,
        )
        .unwrap();

        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.retry_interval(), Duration::from_millis(100));
        assert_eq!(config.circuits.len(), 2);
        assert_eq!(config.circuits[0].conductor, QueueConfig::conductor());
        assert_eq!(config.circuits[0].hold, QueueConfig::hold());
        assert_eq!(config.circuits[1].conductor.capacity, 50);
        assert_eq!(config.circuits[1].on_forward_failure, ForwardFailure::Hold);
    }

    #[test]
    fn test_partial_queue_table_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [[circuits]]
            name = "only-capacity"
            conductor = { capacity = 10 }
            "#,
        )
        .unwrap();
        let conductor = config.circuits[0].conductor;
        assert_eq!(conductor.capacity, 10);
        assert_eq!(conductor.slow_threshold, 0.75);
        assert_eq!(conductor.stop_threshold, 0.95);
        assert_eq!(config.circuits[0].hold, QueueConfig::hold());
    }

    #[test]
    fn test_partial_hold_table_keeps_hold_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [[circuits]]
            name = "c"
            hold = { capacity = 10 }
            "#,
        )
        .unwrap();
        let hold = config.circuits[0].hold;
        assert_eq!(hold.capacity, 10);
        assert_eq!(hold.slow_threshold, 0.50);
        assert_eq!(hold.stop_threshold, 0.95);
        assert_eq!(config.circuits[0].conductor, QueueConfig::conductor());
    }

    #[test]
    fn test_unknown_queue_field_rejected() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [[circuits]]
            name = "typo"
            hold = { capacty = 10 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [[circuits]]
            name = "bad"
            hold = { capacity = 10, slow_threshold = 0.9, stop_threshold = 0.5 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));

        let err = PipelineConfig::from_toml_str("circuits = 3").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }
}
