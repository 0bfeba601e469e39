// Write Executor Module
//
// This module handles the actual filesystem mutation performed by the worker,
// including creating destination directories and replacing file contents.

use std::io::Result as IoResult;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use log::{trace, warn};

use super::request::WriteRequest;
use crate::common::exception::{Result, WriterError};

/// Destination for physical writes.
///
/// The worker never touches the filesystem directly; it goes through a sink so the
/// storage backend can be swapped (the default is [`FsSink`]).
pub trait WriteSink: Send + Sync + std::fmt::Debug + 'static {
    /// Writes `data` to `path`, replacing whatever was there.
    fn write_file<'a>(&'a self, path: &'a Path, data: Bytes) -> BoxFuture<'a, IoResult<()>>;
}

/// Sink backed by `tokio::fs`.
///
/// Creates any missing parent directories, then writes the whole payload, truncating an
/// existing file. The blocking syscalls run on tokio's blocking pool, so aborting the
/// caller does not interrupt a write that has already started.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

impl WriteSink for FsSink {
    fn write_file<'a>(&'a self, path: &'a Path, data: Bytes) -> BoxFuture<'a, IoResult<()>> {
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(path, data).await
        })
    }
}

/// Write executor responsible for performing requests against a sink
#[derive(Debug, Clone)]
pub struct WriteExecutor {
    sink: Arc<dyn WriteSink>,
}

impl WriteExecutor {
    pub fn new(sink: Arc<dyn WriteSink>) -> Self {
        Self { sink }
    }

    /// Performs the write described by `request` without resolving it.
    ///
    /// Errors are tagged with the destination path.
    pub async fn execute(&self, request: &WriteRequest) -> Result<()> {
        trace!(
            "Writing {} bytes to {} (request {})",
            request.data.len(),
            request.path.display(),
            request.id
        );

        self.sink
            .write_file(&request.path, request.data.clone())
            .await
            .map_err(|source| {
                warn!("Write to {} failed: {}", request.path.display(), source);
                WriterError::Io {
                    path: request.path.clone(),
                    source,
                }
            })
    }
}

impl Default for WriteExecutor {
    fn default() -> Self {
        Self::new(Arc::new(FsSink))
    }
}
