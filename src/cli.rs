use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use futures::future::join_all;
use log::{error, info};
use tokio::io::AsyncReadExt;

use crate::common::config::{ENV_BATCH_INTERVAL_MS, ENV_CHANNEL_BUFFER, ENV_SHUTDOWN_TIMEOUT_MS};
use crate::common::exception::{Result, WriterError};
use crate::common::logger::initialize_logger;
use crate::storage::async_writer::{AsyncWriter, WritePriority, WriterConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Writes to perform, as PATH=CONTENT
    writes: Vec<String>,

    /// Read the payload for this path from stdin
    #[arg(long)]
    stdin: Option<PathBuf>,

    /// immediate, batched or on-shutdown
    #[arg(short, long, default_value = "immediate")]
    priority: String,

    #[arg(long, env = ENV_BATCH_INTERVAL_MS)]
    batch_interval_ms: Option<u64>,

    #[arg(long, env = ENV_CHANNEL_BUFFER)]
    channel_buffer: Option<usize>,

    #[arg(long, env = ENV_SHUTDOWN_TIMEOUT_MS)]
    shutdown_timeout_ms: Option<u64>,

    /// Print metrics in Prometheus text format instead of JSON
    #[arg(long)]
    prometheus: bool,
}

impl Args {
    fn writer_config(&self) -> WriterConfig {
        let mut config = WriterConfig::default();
        if let Some(ms) = self.batch_interval_ms {
            config = config.with_batch_interval(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.channel_buffer {
            config = config.with_channel_buffer(capacity);
        }
        if let Some(ms) = self.shutdown_timeout_ms {
            config = config.with_shutdown_timeout(Duration::from_millis(ms));
        }
        config
    }
}

/// Splits a `PATH=CONTENT` argument at the first `=`.
fn parse_write_arg(arg: &str) -> Result<(PathBuf, Bytes)> {
    match arg.split_once('=') {
        Some((path, content)) if !path.is_empty() => {
            Ok((PathBuf::from(path), Bytes::copy_from_slice(content.as_bytes())))
        }
        _ => Err(WriterError::InvalidConfig(format!(
            "expected PATH=CONTENT, got '{}'",
            arg
        ))),
    }
}

/// Logs every failed write and keeps the first error as the overall result.
fn first_failure(results: Vec<Result<()>>) -> Result<()> {
    let failed = results.iter().filter(|r| r.is_err()).count();
    let mut first = None;
    for err in results.into_iter().filter_map(|r| r.err()) {
        error!("{}", err);
        first.get_or_insert(err);
    }

    match first {
        Some(err) => {
            error!("{} write(s) failed", failed);
            Err(err)
        }
        None => Ok(()),
    }
}

pub struct CLI {
    args: Args,
}

impl CLI {
    pub fn new() -> Result<Self> {
        initialize_logger();
        Ok(Self {
            args: Args::parse(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let priority: WritePriority = self.args.priority.parse()?;

        let mut writes = self
            .args
            .writes
            .iter()
            .map(|arg| parse_write_arg(arg))
            .collect::<Result<Vec<_>>>()?;

        if let Some(path) = &self.args.stdin {
            let mut buffer = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buffer)
                .await
                .map_err(|source| WriterError::Io {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            writes.push((path.clone(), Bytes::from(buffer)));
        }

        let writer = AsyncWriter::new(self.args.writer_config())?;
        writer.start()?;
        info!("Submitting {} write(s) with priority {:?}", writes.len(), priority);

        let results = join_all(
            writes
                .into_iter()
                .map(|(path, data)| writer.write(path, data, priority)),
        )
        .await;

        let outcome = first_failure(results);

        writer.shutdown().await?;

        let snapshot = writer.metrics();
        if self.args.prometheus {
            print!("{}", snapshot.to_prometheus());
        } else {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        outcome
    }
}
