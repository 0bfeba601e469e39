//! Process-wide writer for callers that do not want to thread an [`AsyncWriter`] through
//! their code.
//!
//! This is a thin convenience layer; everything here delegates to a regular,
//! caller-owned [`AsyncWriter`]. The worker task runs on the tokio runtime that first
//! creates the global instance, so that runtime must outlive its use.
//!
//! Configure with [`init_global_writer`] before the first [`global_writer`] /
//! [`write_file`] call to avoid starting an instance with the default configuration.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use log::{info, warn};
use parking_lot::{const_mutex, Mutex};

use super::config::{WritePriority, WriterConfig};
use super::manager::AsyncWriter;
use crate::common::exception::Result;

static GLOBAL_WRITER: Mutex<Option<Arc<AsyncWriter>>> = const_mutex(None);

/// Returns the global writer, creating and starting one on first use.
///
/// The lazily created instance uses [`WriterConfig::from_env`].
pub fn global_writer() -> Result<Arc<AsyncWriter>> {
    let mut slot = GLOBAL_WRITER.lock();
    if let Some(writer) = slot.as_ref() {
        return Ok(Arc::clone(writer));
    }

    let writer = Arc::new(AsyncWriter::new(WriterConfig::from_env())?);
    writer.start()?;
    info!("Global writer initialized with default configuration");
    *slot = Some(Arc::clone(&writer));
    Ok(writer)
}

/// Replaces the global writer with a new one built from `config`.
///
/// The replacement is started and swapped into place in one step, so `write_file`
/// never hands out a writer that is being torn down. The instance it displaced is then
/// shut down on a best-effort basis: a failed or timed out drain is logged and does not
/// undo the replacement. Concurrent calls each shut down exactly the instance they
/// displaced. An invalid `config` leaves the current instance untouched.
pub async fn init_global_writer(config: WriterConfig) -> Result<Arc<AsyncWriter>> {
    let writer = Arc::new(AsyncWriter::new(config)?);
    writer.start()?;

    let previous = GLOBAL_WRITER.lock().replace(Arc::clone(&writer));
    info!("Global writer re-initialized: {:?}", writer.config());

    if let Some(previous) = previous {
        if let Err(e) = previous.shutdown().await {
            warn!("Previous global writer did not shut down cleanly: {}", e);
        }
    }

    Ok(writer)
}

/// Drains and removes the global writer, if one exists.
pub async fn shutdown_global_writer() -> Result<()> {
    let previous = GLOBAL_WRITER.lock().take();
    match previous {
        Some(writer) => writer.shutdown().await,
        None => Ok(()),
    }
}

/// Submits a write through the global writer.
pub async fn write_file(
    path: impl Into<PathBuf>,
    data: impl Into<Bytes>,
    priority: WritePriority,
) -> Result<()> {
    global_writer()?.write(path, data, priority).await
}
