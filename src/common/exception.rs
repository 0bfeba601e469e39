use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the write coordinator.
///
/// `ShuttingDown` and `NotStarted` mean the request was never queued. `Io` is only ever
/// delivered to the submitter whose payload was physically written; a request that was
/// superseded by a newer write to the same path resolves successfully instead.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("writer is shutting down; request rejected")]
    ShuttingDown,

    #[error("writer has not been started")]
    NotStarted,

    #[error("writer has already been started")]
    AlreadyStarted,

    #[error("no tokio runtime available to spawn the writer task")]
    NoRuntime,

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "shutdown did not complete within {0:?}; worker was cancelled and in-flight writes may be lost or partially written"
    )]
    ShutdownTimeout(Duration),

    #[error("write worker terminated abnormally: {0}")]
    WorkerFailed(String),

    #[error("invalid writer configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WriterError {
    /// True when the request was refused before reaching the queue.
    pub fn is_rejected(&self) -> bool {
        matches!(self, WriterError::ShuttingDown | WriterError::NotStarted)
    }
}

pub type Result<T> = std::result::Result<T, WriterError>;
