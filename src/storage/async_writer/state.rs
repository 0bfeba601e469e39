use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::common::exception::{Result, WriterError};

/// Lifecycle of an [`AsyncWriter`](super::manager::AsyncWriter).
///
/// `Idle -> Running -> Draining -> Terminated`, never backwards. A forced cancel jumps
/// straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

impl WriterState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WriterState::Idle,
            1 => WriterState::Running,
            2 => WriterState::Draining,
            _ => WriterState::Terminated,
        }
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriterState::Idle => "idle",
            WriterState::Running => "running",
            WriterState::Draining => "draining",
            WriterState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Atomic cell shared by the writer handle and its worker task
#[derive(Debug)]
pub struct SharedState(AtomicU8);

impl SharedState {
    pub fn new() -> Self {
        Self(AtomicU8::new(WriterState::Idle as u8))
    }

    pub fn get(&self) -> WriterState {
        WriterState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves from `from` to `to`; fails if the current state is not `from`.
    pub fn transition(&self, from: WriterState, to: WriterState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Advances to `to` unless the state is already at or past it.
    pub fn advance_to(&self, to: WriterState) -> WriterState {
        let previous = self.0.fetch_max(to as u8, Ordering::AcqRel);
        WriterState::from_u8(previous)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// How a writer's shutdown ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Drained,
    TimedOut(Duration),
    Failed(String),
}

impl ShutdownOutcome {
    pub fn into_result(self) -> Result<()> {
        match self {
            ShutdownOutcome::Drained => Ok(()),
            ShutdownOutcome::TimedOut(timeout) => Err(WriterError::ShutdownTimeout(timeout)),
            ShutdownOutcome::Failed(reason) => Err(WriterError::WorkerFailed(reason)),
        }
    }
}

/// One-shot broadcast of the shutdown outcome.
///
/// Only the first published outcome is kept. Any number of shutdown callers can wait on
/// it, so a caller that does not own the worker's join handle still returns only once
/// the drain has really finished.
#[derive(Debug)]
pub struct ShutdownLatch {
    outcome: watch::Sender<Option<ShutdownOutcome>>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome }
    }

    /// Records `outcome` unless one was already published. Returns whether it was kept.
    pub fn publish(&self, outcome: ShutdownOutcome) -> bool {
        self.outcome.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    pub fn outcome(&self) -> Option<ShutdownOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits until an outcome has been published.
    pub async fn wait(&self) -> ShutdownOutcome {
        let mut receiver = self.outcome.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(ShutdownOutcome::Drained),
            Err(_) => ShutdownOutcome::Drained,
        }
    }
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}
