//! # Pending Write Index
//!
//! [`PendingWrites`] holds deferred (Batched / OnShutdown) requests until the next flush.
//! It keeps at most one request per path: the most recently submitted one.
//!
//! ```text
//!   insert(request for "out/a.png")
//!        │
//!        ▼
//!   ┌───────────────────────────────┐
//!   │ entry for "out/a.png" exists? │
//!   └───────────────┬───────────────┘
//!          ┌────────┴────────┐
//!          │ No              │ Yes
//!          ▼                 ▼
//!   ┌─────────────┐   ┌──────────────────────────────────────┐
//!   │ park request│   │ replace entry with the new request   │
//!   └─────────────┘   │ resolve the old one with Ok(())      │
//!                     │ coalesced_writes += 1                │
//!                     └──────────────────────────────────────┘
//! ```
//!
//! The index is owned by the worker task and mutated through `&mut self`, so replacing
//! an entry and resolving the superseded request happen in one step with no other
//! submission able to observe the intermediate state.

use std::collections::HashMap;
use std::path::PathBuf;

use log::trace;

use super::metrics::WriterMetrics;
use super::request::WriteRequest;

/// Path-keyed index of deferred writes awaiting a flush
#[derive(Debug, Default)]
pub struct PendingWrites {
    entries: HashMap<PathBuf, WriteRequest>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `request`, superseding any pending request for the same path.
    ///
    /// Returns `true` when an older request was coalesced away.
    pub fn insert(&mut self, request: WriteRequest, metrics: &WriterMetrics) -> bool {
        let new_id = request.id;
        match self.entries.insert(request.path.clone(), request) {
            Some(superseded) => {
                trace!(
                    "Request {} for {} superseded by request {}",
                    superseded.id,
                    superseded.path.display(),
                    new_id
                );
                metrics.record_coalesced();
                superseded.complete(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Removes and returns every pending request. Order is unspecified.
    pub fn take_all(&mut self) -> Vec<WriteRequest> {
        self.entries.drain().map(|(_, request)| request).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
