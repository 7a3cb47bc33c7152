//! Engine configuration.
//!
//! Built from environment variables with defaults matching the managed
//! store's limits. Values are validated once at construction; components
//! take the struct, not the environment.

use std::time::Duration;

use compact_store::{RetryPolicy, MAX_TRANSACTION_ITEMS};

/// Tunables shared by every engine component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Items per atomic transaction batch. 1 to [`MAX_TRANSACTION_ITEMS`].
    pub transaction_batch_size: usize,
    /// Events per outbound `publish_batch` call.
    pub event_batch_size: usize,
    /// Backoff for unprocessed batch-read keys.
    pub batch_get_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_batch_size: MAX_TRANSACTION_ITEMS,
            event_batch_size: 10,
            batch_get_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `COMPACT_TRANSACTION_BATCH_SIZE` (default: 100, max 100)
    /// - `COMPACT_EVENT_BATCH_SIZE` (default: 10)
    /// - `COMPACT_BATCH_GET_MAX_RETRIES` (default: 3)
    /// - `COMPACT_BATCH_GET_BASE_BACKOFF_MS` (default: 100)
    /// - `COMPACT_BATCH_GET_MAX_BACKOFF_MS` (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            transaction_batch_size: parse_var(
                &lookup,
                "COMPACT_TRANSACTION_BATCH_SIZE",
                defaults.transaction_batch_size,
            )?,
            event_batch_size: parse_var(
                &lookup,
                "COMPACT_EVENT_BATCH_SIZE",
                defaults.event_batch_size,
            )?,
            batch_get_retry: RetryPolicy {
                max_retries: parse_var(
                    &lookup,
                    "COMPACT_BATCH_GET_MAX_RETRIES",
                    defaults.batch_get_retry.max_retries,
                )?,
                base_delay: Duration::from_millis(parse_var(
                    &lookup,
                    "COMPACT_BATCH_GET_BASE_BACKOFF_MS",
                    100u64,
                )?),
                max_delay: Duration::from_millis(parse_var(
                    &lookup,
                    "COMPACT_BATCH_GET_MAX_BACKOFF_MS",
                    5_000u64,
                )?),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transaction_batch_size == 0 || self.transaction_batch_size > MAX_TRANSACTION_ITEMS
        {
            return Err(ConfigError::OutOfRange {
                var: "COMPACT_TRANSACTION_BATCH_SIZE",
                value: self.transaction_batch_size.to_string(),
                expected: "1..=100",
            });
        }
        if self.event_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                var: "COMPACT_EVENT_BATCH_SIZE",
                value: "0".to_string(),
                expected: "at least 1",
            });
        }
        if self.batch_get_retry.base_delay > self.batch_get_retry.max_delay {
            return Err(ConfigError::OutOfRange {
                var: "COMPACT_BATCH_GET_BASE_BACKOFF_MS",
                value: self.batch_get_retry.base_delay.as_millis().to_string(),
                expected: "no greater than COMPACT_BATCH_GET_MAX_BACKOFF_MS",
            });
        }
        Ok(())
    }

    /// Defaults with zero backoff. For tests and the CLI simulator.
    pub fn immediate() -> Self {
        Self {
            batch_get_retry: RetryPolicy::immediate(RetryPolicy::default().max_retries),
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var}={value} is out of range (expected {expected})")]
    OutOfRange {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}
