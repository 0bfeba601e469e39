//! Configuration for the async writer
//!
//! This module contains the configuration structure and the priority classes accepted by
//! the async writer. A [`WriterConfig`] is frozen once an [`AsyncWriter`] is built from
//! it; changing settings means building a new writer.
//!
//! [`AsyncWriter`]: super::manager::AsyncWriter

use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::common::config::{
    DEFAULT_BATCH_INTERVAL, DEFAULT_CHANNEL_BUFFER, DEFAULT_SHUTDOWN_TIMEOUT,
    ENV_BATCH_INTERVAL_MS, ENV_CHANNEL_BUFFER, ENV_SHUTDOWN_TIMEOUT_MS,
};
use crate::common::exception::{Result, WriterError};

/// Priority classes for submitted writes
///
/// | Class        | Behavior                                                      |
/// |--------------|---------------------------------------------------------------|
/// | `Immediate`  | Written as soon as the worker dequeues it; caller waits       |
/// | `Batched`    | Parked in the pending index, coalesced, flushed on the timer  |
/// | `OnShutdown` | Handled exactly like `Batched` on every flush trigger         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePriority {
    Immediate,
    Batched,
    OnShutdown,
}

impl WritePriority {
    /// Whether requests of this class wait in the pending index for a flush.
    pub fn is_deferred(self) -> bool {
        !matches!(self, WritePriority::Immediate)
    }
}

impl FromStr for WritePriority {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "immediate" => Ok(WritePriority::Immediate),
            "batched" => Ok(WritePriority::Batched),
            "on_shutdown" | "onshutdown" => Ok(WritePriority::OnShutdown),
            other => Err(WriterError::InvalidConfig(format!(
                "unknown write priority '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the async writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Period of the flush timer for deferred writes
    #[serde(rename = "batch_interval_ms", with = "duration_ms")]
    pub batch_interval: Duration,

    /// Capacity of the bounded submission queue
    pub channel_buffer: usize,

    /// How long `shutdown()` waits for the drain before cancelling the worker
    #[serde(rename = "shutdown_timeout_ms", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_interval: DEFAULT_BATCH_INTERVAL,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl WriterConfig {
    pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
        self.batch_interval = batch_interval;
        self
    }

    pub fn with_channel_buffer(mut self, channel_buffer: usize) -> Self {
        self.channel_buffer = channel_buffer;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Builds a configuration from the defaults, overridden by any of
    /// `SCRIVENER_BATCH_INTERVAL_MS`, `SCRIVENER_CHANNEL_BUFFER` and
    /// `SCRIVENER_SHUTDOWN_TIMEOUT_MS` that are set.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>(ENV_BATCH_INTERVAL_MS) {
            config.batch_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = read_env::<usize>(ENV_CHANNEL_BUFFER) {
            config.channel_buffer = capacity;
        }
        if let Some(ms) = read_env::<u64>(ENV_SHUTDOWN_TIMEOUT_MS) {
            config.shutdown_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Rejects settings the runtime cannot honor.
    ///
    /// A zero-capacity queue cannot be constructed and a zero interval would spin the
    /// flush timer.
    pub fn validate(&self) -> Result<()> {
        if self.channel_buffer == 0 {
            return Err(WriterError::InvalidConfig(
                "channel_buffer must be greater than zero".to_string(),
            ));
        }
        if self.batch_interval.is_zero() {
            return Err(WriterError::InvalidConfig(
                "batch_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
