// Write Worker Module
//
// This module holds the single task that performs every filesystem write for a writer:
// dequeuing requests, parking deferred ones, flushing on the timer and draining on
// shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::executor::WriteExecutor;
use super::metrics::WriterMetrics;
use super::pending::PendingWrites;
use super::request::WriteRequest;
use super::state::{SharedState, ShutdownLatch, ShutdownOutcome, WriterState};
use crate::common::exception::Result;

/// What caused a flush pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Periodic,
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Periodic => f.write_str("periodic"),
            FlushTrigger::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// The actor that owns the pending index and performs all writes
///
/// ```text
///   loop {
///       select! (biased) {
///           shutdown signal  -> break
///           flush timer      -> flush(Periodic)
///           queue.recv()     -> dispatch(request)
///       }
///   }
///   drain:  close queue -> dispatch everything still buffered -> flush(Shutdown)
/// ```
#[derive(Debug)]
pub struct WriteWorker {
    receiver: mpsc::Receiver<WriteRequest>,
    pending: PendingWrites,
    executor: WriteExecutor,
    metrics: Arc<WriterMetrics>,
    state: Arc<SharedState>,
    shutdown_signal: Arc<Notify>,
    shutdown_latch: Arc<ShutdownLatch>,
    batch_interval: Duration,
}

impl WriteWorker {
    pub fn new(
        receiver: mpsc::Receiver<WriteRequest>,
        executor: WriteExecutor,
        metrics: Arc<WriterMetrics>,
        state: Arc<SharedState>,
        shutdown_signal: Arc<Notify>,
        shutdown_latch: Arc<ShutdownLatch>,
        batch_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            pending: PendingWrites::new(),
            executor,
            metrics,
            state,
            shutdown_signal,
            shutdown_latch,
            batch_interval,
        }
    }

    /// Runs until the shutdown signal fires or every submission handle is gone, then
    /// drains.
    pub async fn run(mut self) {
        debug!(
            "Write worker started (batch interval {:?})",
            self.batch_interval
        );

        let mut ticker = interval_at(Instant::now() + self.batch_interval, self.batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_signal.notified() => {
                    debug!("Write worker received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.flush(FlushTrigger::Periodic).await;
                }

                request = self.receiver.recv() => match request {
                    Some(request) => self.dispatch(request).await,
                    None => {
                        debug!("All submission handles dropped; write worker stopping");
                        break;
                    }
                },
            }
        }

        self.state.advance_to(WriterState::Draining);
        self.drain().await;
        self.state.advance_to(WriterState::Terminated);
        self.shutdown_latch.publish(ShutdownOutcome::Drained);
        info!("Write worker terminated");
    }

    /// Routes one dequeued request by priority.
    async fn dispatch(&mut self, request: WriteRequest) {
        trace!(
            "Dispatching request {} ({:?}) for {}, queued for {:?}",
            request.id,
            request.priority,
            request.path.display(),
            request.submitted_at.elapsed()
        );

        if request.priority.is_deferred() {
            self.pending.insert(request, &self.metrics);
            return;
        }

        let result = self.executor.execute(&request).await;
        self.metrics.record_immediate_write();
        self.record_outcome(&result, request.data.len());
        request.complete(result);
    }

    /// Writes every pending entry, resolving each with its own write result.
    ///
    /// Returns the number of files written.
    async fn flush(&mut self, trigger: FlushTrigger) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let batch = self.pending.take_all();
        let count = batch.len();
        debug!("{} flush writing {} pending file(s)", trigger, count);

        for request in batch {
            let result = self.executor.execute(&request).await;
            self.metrics.record_batched_write();
            self.record_outcome(&result, request.data.len());
            request.complete(result);
        }

        self.metrics.record_flush();
        count
    }

    /// Consumes whatever is still queued, then flushes everything.
    async fn drain(&mut self) {
        // No new submissions past this point; buffered ones remain receivable.
        self.receiver.close();

        let mut drained = 0usize;
        while let Ok(request) = self.receiver.try_recv() {
            self.dispatch(request).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("Drained {} queued request(s) during shutdown", drained);
        }

        let written = self.flush(FlushTrigger::Shutdown).await;
        info!(
            "Shutdown drain complete: {} queued request(s), {} pending file(s) written",
            drained, written
        );
    }

    fn record_outcome(&self, result: &Result<()>, bytes: usize) {
        match result {
            Ok(()) => self.metrics.record_bytes_written(bytes),
            Err(_) => self.metrics.record_error(),
        }
    }
}
