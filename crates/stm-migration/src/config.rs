//! Migration configuration
//!
//! Parameterizes worker parallelism, queue capacities and progress logging.
//! Immutable for the lifetime of a run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration of a state tree migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Number of migration workers.
    /// More workers enable higher CPU utilization on state re-encoding.
    pub max_workers: usize,
    /// Capacity of the job queue (zero for the smallest hand-off buffer).
    /// Hundreds to thousands improve throughput at the cost of memory.
    pub job_queue_size: usize,
    /// Capacity of the result queue (zero for the smallest hand-off buffer).
    /// Tens to hundreds improve throughput at the cost of memory.
    pub result_queue_size: usize,
    /// Time between progress logs; zero disables them
    #[serde(rename = "progress_log_period_ms", with = "duration_ms")]
    pub progress_log_period: Duration,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// With job queue capacity
    #[inline]
    #[must_use]
    pub fn with_job_queue_size(mut self, size: usize) -> Self {
        self.job_queue_size = size;
        self
    }

    /// With result queue capacity
    #[inline]
    #[must_use]
    pub fn with_result_queue_size(mut self, size: usize) -> Self {
        self.result_queue_size = size;
        self
    }

    /// With progress log period
    #[inline]
    #[must_use]
    pub fn with_progress_log_period(mut self, period: Duration) -> Self {
        self.progress_log_period = period;
        self
    }

    /// Check invariants
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidWorkers`] if no workers are configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.max_workers));
        }
        Ok(())
    }

    /// Parse from TOML text; missing keys take defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Channel capacity for the job queue
    pub(crate) fn job_channel_capacity(&self) -> usize {
        channel_capacity(self.job_queue_size)
    }

    /// Channel capacity for the result queue
    pub(crate) fn result_channel_capacity(&self) -> usize {
        channel_capacity(self.result_queue_size)
    }
}

/// Bounded channels hold at least one item and at most what tokio's
/// semaphore can count.
fn channel_capacity(size: usize) -> usize {
    size.clamp(1, tokio::sync::Semaphore::MAX_PERMITS)
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism().map_or(4, usize::from),
            job_queue_size: 1000,
            result_queue_size: 100,
            progress_log_period: Duration::ZERO,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MigrationConfig::default();
        assert!(config.max_workers > 0);
        assert!(config.validate().is_ok());
        assert_eq!(config.progress_log_period, Duration::ZERO);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = MigrationConfig::new().with_max_workers(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidWorkers(0)));
    }

    #[test]
    fn unbuffered_queues_map_to_single_slot() {
        let config = MigrationConfig::new()
            .with_job_queue_size(0)
            .with_result_queue_size(0);
        assert_eq!(config.job_channel_capacity(), 1);
        assert_eq!(config.result_channel_capacity(), 1);

        let config = config.with_job_queue_size(64);
        assert_eq!(config.job_channel_capacity(), 64);
    }

    #[test]
    fn oversized_queues_clamp_to_channel_limit() {
        let config = MigrationConfig::new()
            .with_job_queue_size(usize::MAX)
            .with_result_queue_size(tokio::sync::Semaphore::MAX_PERMITS + 1);
        assert!(config.validate().is_ok());
        assert_eq!(config.job_channel_capacity(), tokio::sync::Semaphore::MAX_PERMITS);
        assert_eq!(config.result_channel_capacity(), tokio::sync::Semaphore::MAX_PERMITS);

        let config = config.with_job_queue_size(tokio::sync::Semaphore::MAX_PERMITS);
        assert_eq!(config.job_channel_capacity(), tokio::sync::Semaphore::MAX_PERMITS);
    }

    #[test]
    fn toml_partial_uses_defaults() {
        let config = MigrationConfig::from_toml_str(
            "max_workers = 3\nprogress_log_period_ms = 1500\n",
        )
        .unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.progress_log_period, Duration::from_millis(1500));
        assert_eq!(config.job_queue_size, 1000);
        assert_eq!(config.result_queue_size, 100);
    }

    #[test]
    fn toml_round_trip() {
        let config = MigrationConfig::new()
            .with_max_workers(2)
            .with_job_queue_size(0)
            .with_progress_log_period(Duration::from_secs(5));
        let text = config.to_toml_string().unwrap();
        assert_eq!(MigrationConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn toml_wrong_type_is_parse_error() {
        let err = MigrationConfig::from_toml_str("max_workers = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
