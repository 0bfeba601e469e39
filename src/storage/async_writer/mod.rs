//! Async Writer Module
//!
//! This module implements an asynchronous, priority-aware file-write coordinator. Many
//! tasks submit `(path, bytes, priority)` requests; a single background worker performs
//! every write, coalescing deferred writes to the same path so only the latest payload
//! reaches disk, and draining everything that is still queued on shutdown.
//!
//! # Submodules
//!
//! - [`config`]: [`WriterConfig`] and the [`WritePriority`] classes.
//! - [`request`]: The request envelope carrying the completion channel.
//! - [`executor`]: The write primitive and the pluggable [`WriteSink`].
//! - [`pending`]: The path-keyed index of deferred writes.
//! - [`worker`]: The actor loop that owns the pending index.
//! - [`state`]: Lifecycle states shared by handle and worker.
//! - [`manager`]: [`AsyncWriter`], the caller-facing handle.
//! - [`metrics`]: Lock-free counters and snapshots.
//! - [`global`]: Optional process-wide instance.

// Core components
pub mod config;
pub mod manager;
pub mod request;
pub mod state;

// Write path
pub mod executor;
pub mod pending;
pub mod worker;

// Observability and convenience
pub mod global;
pub mod metrics;

pub use config::{WritePriority, WriterConfig};
pub use executor::{FsSink, WriteSink};
pub use global::{global_writer, init_global_writer, shutdown_global_writer, write_file};
pub use manager::AsyncWriter;
pub use metrics::MetricsSnapshot;
pub use state::WriterState;
