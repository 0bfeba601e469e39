//! # Async Writer
//!
//! [`AsyncWriter`] is the caller-facing handle of the write coordinator. It owns the
//! submission side of a bounded queue and the lifecycle of the single worker task that
//! performs every write.
//!
//! ## Architecture
//!
//! ```text
//!   Callers (any number of tasks)
//!   ═══════════════════════════════════════════════════════════════════════════
//!          │ write(path, data, priority).await
//!          ▼
//!   ┌─────────────────────────────────────────────────────────────────────────┐
//!   │                          AsyncWriter                                    │
//!   │                                                                         │
//!   │   state check ── Idle ──────────────► Err(NotStarted)                   │
//!   │               ── Draining/Terminated ► Err(ShuttingDown)                │
//!   │               ── Running ─┐                                             │
//!   │                           ▼                                             │
//!   │   mpsc::Sender<WriteRequest>   (capacity = channel_buffer)              │
//!   └───────────────────────────┬─────────────────────────────────────────────┘
//!                               │ backpressure when full
//!                               ▼
//!   ┌─────────────────────────────────────────────────────────────────────────┐
//!   │  WriteWorker (one tokio task)                                           │
//!   │    Immediate  → WriteExecutor now                                       │
//!   │    Batched /  → PendingWrites (last write per path wins)                │
//!   │    OnShutdown                                                           │
//!   │    timer      → flush PendingWrites                                     │
//!   │    shutdown   → close queue, drain, flush, exit                         │
//!   └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! | Method                     | Description                                     |
//! |----------------------------|-------------------------------------------------|
//! | `new()` / `with_sink()`    | Build the queue and park the worker             |
//! | `start()`                  | Spawn the worker on the current tokio runtime   |
//! | `write()`                  | Submit and await completion                     |
//! | `shutdown()`               | Drain within the configured timeout             |
//! | `shutdown_with_timeout()`  | Same, with an explicit bound                    |
//! | `metrics()`                | Point-in-time counter snapshot                  |
//!
//! ## Forced cancellation
//!
//! When the drain overruns its timeout the worker task is aborted. Dropping the task
//! drops the queue and every unresolved request, so each parked submitter wakes up with
//! [`WriterError::ShuttingDown`]. A write already handed to the operating system is not
//! interrupted and may complete, fail or be left partial; nothing is rolled back.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let writer = AsyncWriter::new(WriterConfig::default())?;
//! writer.start()?;
//!
//! writer.write("out/report.json", json_bytes, WritePriority::Immediate).await?;
//! writer.write("out/preview.png", png_bytes, WritePriority::Batched).await?;
//!
//! writer.shutdown().await?;
//! println!("{}", writer.metrics().to_prometheus());
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use super::config::{WritePriority, WriterConfig};
use super::executor::{FsSink, WriteExecutor, WriteSink};
use super::metrics::{MetricsSnapshot, WriterMetrics};
use super::request::{await_completion, WriteRequest};
use super::state::{SharedState, ShutdownLatch, ShutdownOutcome, WriterState};
use super::worker::WriteWorker;
use crate::common::exception::{Result, WriterError};

/// Asynchronous, priority-aware file-write coordinator
#[derive(Debug)]
pub struct AsyncWriter {
    config: WriterConfig,

    sender: mpsc::Sender<WriteRequest>,

    // Worker built at construction, moved onto the runtime by `start()`
    parked_worker: Mutex<Option<WriteWorker>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,

    metrics: Arc<WriterMetrics>,
    state: Arc<SharedState>,
    shutdown_signal: Arc<Notify>,
    shutdown_latch: Arc<ShutdownLatch>,
    next_request_id: AtomicU64,
}

impl AsyncWriter {
    /// Creates a writer that writes to the local filesystem.
    pub fn new(config: WriterConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(FsSink))
    }

    /// Creates a writer that performs its physical writes through `sink`.
    pub fn with_sink(config: WriterConfig, sink: Arc<dyn WriteSink>) -> Result<Self> {
        config.validate()?;
        debug!(
            "Creating AsyncWriter - batch_interval: {:?}, channel_buffer: {}, shutdown_timeout: {:?}",
            config.batch_interval, config.channel_buffer, config.shutdown_timeout
        );

        let (sender, receiver) = mpsc::channel(config.channel_buffer);
        let metrics = Arc::new(WriterMetrics::new());
        let state = Arc::new(SharedState::new());
        let shutdown_signal = Arc::new(Notify::new());
        let shutdown_latch = Arc::new(ShutdownLatch::new());

        let worker = WriteWorker::new(
            receiver,
            WriteExecutor::new(sink),
            Arc::clone(&metrics),
            Arc::clone(&state),
            Arc::clone(&shutdown_signal),
            Arc::clone(&shutdown_latch),
            config.batch_interval,
        );

        Ok(Self {
            config,
            sender,
            parked_worker: Mutex::new(Some(worker)),
            worker_handle: Mutex::new(None),
            metrics,
            state,
            shutdown_signal,
            shutdown_latch,
            next_request_id: AtomicU64::new(0),
        })
    }

    /// Spawns the worker task on the current tokio runtime.
    ///
    /// Must be called from within a runtime. A writer can be started once.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| WriterError::NoRuntime)?;

        let mut parked = self.parked_worker.lock();
        let worker = match self.state.get() {
            WriterState::Idle => parked.take().ok_or(WriterError::AlreadyStarted)?,
            WriterState::Running => return Err(WriterError::AlreadyStarted),
            WriterState::Draining | WriterState::Terminated => {
                return Err(WriterError::ShuttingDown)
            }
        };

        // Held until the handle is stored, so a shutdown that observes `Running` always
        // finds the handle to signal and join.
        let mut worker_handle = self.worker_handle.lock();
        if !self.state.transition(WriterState::Idle, WriterState::Running) {
            // Shutdown won the race; the worker is dropped unstarted.
            return Err(WriterError::ShuttingDown);
        }
        *worker_handle = Some(runtime.spawn(worker.run()));
        drop(worker_handle);

        info!(
            "AsyncWriter started (batch interval {:?}, queue capacity {})",
            self.config.batch_interval, self.config.channel_buffer
        );
        Ok(())
    }

    /// Submits a write and waits for it to be resolved.
    ///
    /// Immediate writes resolve once the file is written. Deferred writes resolve at the
    /// next flush, or immediately with `Ok(())` if a newer write to the same path
    /// supersedes them first. Every call counts towards `total_requests`.
    pub async fn write(
        &self,
        path: impl Into<PathBuf>,
        data: impl Into<Bytes>,
        priority: WritePriority,
    ) -> Result<()> {
        self.metrics.record_request();

        match self.state.get() {
            WriterState::Running => {}
            WriterState::Idle => return Err(WriterError::NotStarted),
            WriterState::Draining | WriterState::Terminated => {
                return Err(WriterError::ShuttingDown)
            }
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (request, receiver) = WriteRequest::new(id, path.into(), data.into(), priority);

        // Fails once the worker has closed or dropped the queue.
        self.sender
            .send(request)
            .await
            .map_err(|_| WriterError::ShuttingDown)?;

        await_completion(receiver).await
    }

    /// Drains and stops the worker, waiting at most the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(self.config.shutdown_timeout)
            .await
    }

    /// Drains and stops the worker, waiting at most `timeout`.
    ///
    /// On timeout the worker is cancelled and [`WriterError::ShutdownTimeout`] is
    /// returned; in-flight data may be lost or partially written. A caller that arrives
    /// while another shutdown is draining waits, up to its own `timeout`, for that drain
    /// and gets its outcome. Calling this again after the writer has stopped returns
    /// `Ok(())`.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        match self.state.advance_to(WriterState::Draining) {
            WriterState::Idle => {
                self.parked_worker.lock().take();
                self.state.advance_to(WriterState::Terminated);
                self.shutdown_latch.publish(ShutdownOutcome::Drained);
                info!("AsyncWriter shut down before it was started");
                return Ok(());
            }
            WriterState::Terminated => return Ok(()),
            WriterState::Running | WriterState::Draining => {}
        }

        let handle = self.worker_handle.lock().take();
        let Some(mut handle) = handle else {
            debug!("Shutdown already in progress elsewhere; waiting for its outcome");
            return match tokio::time::timeout(timeout, self.shutdown_latch.wait()).await {
                Ok(outcome) => outcome.into_result(),
                Err(_) => Err(WriterError::ShutdownTimeout(timeout)),
            };
        };

        info!("Shutting down AsyncWriter (timeout {:?})", timeout);
        self.shutdown_signal.notify_one();

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("AsyncWriter shutdown completed");
                Ok(())
            }
            Ok(Err(join_error)) => {
                self.state.advance_to(WriterState::Terminated);
                error!("Write worker terminated abnormally: {}", join_error);
                let outcome = ShutdownOutcome::Failed(join_error.to_string());
                self.shutdown_latch.publish(outcome.clone());
                outcome.into_result()
            }
            Err(_) => {
                handle.abort();
                self.state.advance_to(WriterState::Terminated);
                self.shutdown_latch.publish(ShutdownOutcome::TimedOut(timeout));
                warn!(
                    "AsyncWriter drain exceeded {:?}; worker cancelled, in-flight writes may be lost",
                    timeout
                );
                Err(WriterError::ShutdownTimeout(timeout))
            }
        }
    }

    pub fn state(&self) -> WriterState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == WriterState::Running
    }

    /// Point-in-time snapshot of the writer's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if self.worker_handle.get_mut().is_some() {
            // The worker sees the queue close and drains on its own.
            warn!("AsyncWriter dropped without shutdown; worker will drain in the background");
        }
    }
}
