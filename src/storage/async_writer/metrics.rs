//! # Writer Metrics
//!
//! [`WriterMetrics`] is the "hot storage" for the writer's counters, and
//! [`MetricsSnapshot`] is the point-in-time copy handed to observers.
//!
//! ## Design
//!
//! - **Lock-Free**: every counter is an `AtomicU64`. Submitters bump `total_requests`
//!   and the worker bumps everything else, so readers never contend with the hot path.
//! - **Monotonic**: counters only ever increase for the lifetime of the writer.
//!
//! | Counter            | Incremented when                                         |
//! |--------------------|----------------------------------------------------------|
//! | `total_requests`   | `write()` is called, whatever the outcome                |
//! | `immediate_writes` | an Immediate request is physically written (or attempted)|
//! | `batched_writes`   | a pending entry is physically written during a flush     |
//! | `coalesced_writes` | a pending entry is superseded by a newer one             |
//! | `errors`           | a physical write fails                                   |
//! | `flushes`          | a flush pass processes at least one entry                |
//! | `bytes_written`    | a physical write succeeds (payload length)               |

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::common::config::METRICS_PREFIX;

/// Live counters shared between the submitters, the worker and observers
#[derive(Debug, Default)]
pub struct WriterMetrics {
    total_requests: AtomicU64,
    immediate_writes: AtomicU64,
    batched_writes: AtomicU64,
    coalesced_writes: AtomicU64,
    errors: AtomicU64,
    flushes: AtomicU64,
    bytes_written: AtomicU64,
}

impl WriterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_immediate_write(&self) {
        self.immediate_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batched_write(&self) {
        self.batched_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Captures the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            immediate_writes: self.immediate_writes.load(Ordering::Relaxed),
            batched_writes: self.batched_writes.load(Ordering::Relaxed),
            coalesced_writes: self.coalesced_writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of writer metrics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub immediate_writes: u64,
    pub batched_writes: u64,
    pub coalesced_writes: u64,
    pub errors: u64,
    pub flushes: u64,
    pub bytes_written: u64,
}

impl MetricsSnapshot {
    /// Renders the snapshot in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 7] = [
            ("requests_total", "Total number of write submissions", self.total_requests),
            ("immediate_writes_total", "Immediate writes performed", self.immediate_writes),
            ("batched_writes_total", "Deferred writes performed by a flush", self.batched_writes),
            ("coalesced_writes_total", "Deferred writes superseded before reaching disk", self.coalesced_writes),
            ("errors_total", "Physical writes that failed", self.errors),
            ("flushes_total", "Flush passes that wrote at least one file", self.flushes),
            ("bytes_written_total", "Payload bytes successfully written", self.bytes_written),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {}_{} {}", METRICS_PREFIX, name, help);
            let _ = writeln!(output, "# TYPE {}_{} counter", METRICS_PREFIX, name);
            let _ = writeln!(output, "{}_{} {}", METRICS_PREFIX, name, value);
        }
        output
    }
}
