//! # Relay Configuration System
//!
//! Typed configuration for the queue, worker pool, broker connection and
//! in-process backoff, loaded by [`ConfigManager`] from layered sources.
//!
//! ## Architecture
//!
//! - **Defaults**: every field has a default, so an empty file is valid
//! - **File**: optional TOML file overriding the defaults
//! - **Environment**: `RELAY__SECTION__KEY` variables override both
//! - **Explicit Validation**: values that would stall or spin the pool are rejected
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_core::config::ConfigManager;
//!
//! # fn main() -> relay_core::error::Result<()> {
//! let manager = ConfigManager::load()?;
//! let worker = manager.config().worker_config();
//! let connection = manager.config().connection_config();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::error::{EventBusError, Result};
use crate::messaging::connection::ConnectionConfig;
use crate::resilience::backoff::ExponentialBackoff;
use crate::worker::pool::WorkerConfig;

pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub queue: QueueConfig,
    pub worker: WorkerSettings,
    pub connection: ConnectionSettings,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base name of the queue regions
    pub name: String,
    pub batch_size: usize,
    pub pop_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: defaults::QUEUE_NAME.to_string(),
            batch_size: defaults::BATCH_SIZE,
            pop_timeout_ms: defaults::POP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub num_workers: usize,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Broker URL; credentials are redacted in logs
    pub url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: defaults::CONNECTION_URL.to_string(),
            max_retries: defaults::CONNECTION_MAX_RETRIES,
            retry_delay_ms: defaults::CONNECTION_RETRY_DELAY_MS,
            health_check_interval_ms: defaults::HEALTH_CHECK_INTERVAL_MS,
        }
    }
}

/// Backoff for [`RetryingHandler`](crate::resilience::RetryingHandler)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::BACKOFF_BASE_DELAY_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            max_delay_ms: defaults::BACKOFF_MAX_DELAY_MS,
            jitter_factor: defaults::BACKOFF_JITTER_FACTOR,
            max_attempts: defaults::BACKOFF_MAX_ATTEMPTS,
        }
    }
}

impl RelayConfig {
    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue.name.trim().is_empty() {
            return Err(EventBusError::configuration(
                "queue.name",
                "queue name must not be empty",
            ));
        }

        if self.queue.batch_size == 0 {
            return Err(EventBusError::configuration(
                "queue.batch_size",
                "batch size must be greater than 0",
            ));
        }

        if self.worker.num_workers == 0 {
            return Err(EventBusError::configuration(
                "worker.num_workers",
                "worker count must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            return Err(EventBusError::configuration(
                "backoff.jitter_factor",
                format!(
                    "jitter factor must be between 0.0 and 1.0, got {}",
                    self.backoff.jitter_factor
                ),
            ));
        }

        if self.backoff.multiplier.is_nan() || self.backoff.multiplier < 1.0 {
            return Err(EventBusError::configuration(
                "backoff.multiplier",
                format!(
                    "multiplier must be at least 1.0, got {}",
                    self.backoff.multiplier
                ),
            ));
        }

        Ok(())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.queue.batch_size,
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
            pop_timeout: Duration::from_millis(self.queue.pop_timeout_ms),
            max_retries: self.worker.max_retries,
            retry_delay: Duration::from_millis(self.worker.retry_delay_ms),
            num_workers: self.worker.num_workers,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_retries: self.connection.max_retries,
            retry_delay: Duration::from_millis(self.connection.retry_delay_ms),
            health_check_interval: Duration::from_millis(self.connection.health_check_interval_ms),
        }
    }

    pub fn exponential_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: Duration::from_millis(self.backoff.base_delay_ms),
            multiplier: self.backoff.multiplier,
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            jitter_factor: self.backoff.jitter_factor,
            max_attempts: self.backoff.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.name, "events");

        let worker = config.worker_config();
        assert_eq!(worker.batch_size, 10);
        assert_eq!(worker.retry_delay, Duration::from_secs(5));
        assert_eq!(worker, WorkerConfig::default());
        assert_eq!(config.connection_config(), ConnectionConfig::default());
        assert_eq!(config.exponential_backoff(), ExponentialBackoff::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RelayConfig::default();
        config.queue.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(EventBusError::Configuration { component, .. }) if component == "queue.batch_size"
        ));

        let mut config = RelayConfig::default();
        config.worker.num_workers = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.queue.name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.backoff.jitter_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiplier_bounds() {
        let mut config = RelayConfig::default();
        config.backoff.multiplier = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(EventBusError::Configuration { component, .. }) if component == "backoff.multiplier"
        ));

        config.backoff.multiplier = 1.0;
        assert!(config.validate().is_ok());
    }
}
