//! # Write Request Envelope
//!
//! A [`WriteRequest`] carries everything the worker needs to perform one write: the
//! destination path, the payload, the priority class and the single-use completion
//! channel back to the submitter.
//!
//! ```text
//!   AsyncWriter::write(path, data, priority)
//!          │
//!          │ WriteRequest::new() -> (request, CompletionReceiver)
//!          ▼
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │  WriteRequest                                               │
//!   │    id, path, data: Bytes, priority, submitted_at            │
//!   │    completion: oneshot::Sender<Result<()>>                  │
//!   └─────────────────────────────────────────────────────────────┘
//!          │ bounded mpsc queue
//!          ▼
//!   WriteWorker  ──►  complete(result)  ──►  submitter wakes up
//! ```
//!
//! `complete` takes `self` by value, so a request can be resolved at most once. A request
//! that is dropped unresolved (worker cancelled) closes the channel, which the submitter
//! reports as [`WriterError::ShuttingDown`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use log::trace;
use tokio::sync::oneshot;

use super::config::WritePriority;
use crate::common::exception::{Result, WriterError};

/// Receiving half handed back to the submitter.
pub type CompletionReceiver = oneshot::Receiver<Result<()>>;

/// A single write submitted to the worker
#[derive(Debug)]
pub struct WriteRequest {
    /// Unique request identifier, used for tracing
    pub id: u64,

    pub path: PathBuf,

    /// Payload written verbatim
    pub data: Bytes,

    pub priority: WritePriority,

    /// Timestamp when the request was created
    pub submitted_at: Instant,

    completion: oneshot::Sender<Result<()>>,
}

impl WriteRequest {
    pub fn new(
        id: u64,
        path: PathBuf,
        data: Bytes,
        priority: WritePriority,
    ) -> (Self, CompletionReceiver) {
        let (completion, receiver) = oneshot::channel();
        let request = Self {
            id,
            path,
            data,
            priority,
            submitted_at: Instant::now(),
            completion,
        };
        (request, receiver)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the request, consuming it.
    pub fn complete(self, result: Result<()>) {
        let id = self.id;
        if self.completion.send(result).is_err() {
            trace!("Submitter for request {} went away before completion", id);
        }
    }
}

/// Awaits a completion channel, mapping a dropped sender to `ShuttingDown`.
pub async fn await_completion(receiver: CompletionReceiver) -> Result<()> {
    receiver.await.unwrap_or(Err(WriterError::ShuttingDown))
}
