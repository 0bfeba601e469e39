pub mod cli;
pub mod common;
pub mod storage;

pub use common::exception::{Result, WriterError};
pub use storage::async_writer::{AsyncWriter, MetricsSnapshot, WritePriority, WriterConfig};
