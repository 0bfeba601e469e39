use std::time::Duration;

/** Pending deferred writes are flushed every DEFAULT_BATCH_INTERVAL. */
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(100);

/** Capacity of the bounded submission queue. */
pub const DEFAULT_CHANNEL_BUFFER: usize = 1024;

/** Upper bound on how long shutdown waits for the drain to finish. */
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// Environment overrides read by `WriterConfig::from_env`
pub const ENV_BATCH_INTERVAL_MS: &str = "SCRIVENER_BATCH_INTERVAL_MS";
pub const ENV_CHANNEL_BUFFER: &str = "SCRIVENER_CHANNEL_BUFFER";
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "SCRIVENER_SHUTDOWN_TIMEOUT_MS";

/// Prefix shared by every exported Prometheus metric name.
pub const METRICS_PREFIX: &str = "scrivener";
