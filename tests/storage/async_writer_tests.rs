use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scrivener::common::exception::WriterError;
use scrivener::storage::async_writer::{AsyncWriter, WritePriority, WriterConfig, WriterState};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::common::logger::init_test_logger;
use crate::common::sinks::{wait_until, GatedSink, SlowSink};
use crate::{assert_err, assert_ok};

/// Interval long enough that no periodic flush fires during a test.
const NEVER: Duration = Duration::from_secs(3600);

struct TestContext {
    writer: Arc<AsyncWriter>,
    temp_dir: TempDir,
}

impl TestContext {
    fn new(config: WriterConfig) -> Self {
        init_test_logger();
        let writer = Arc::new(AsyncWriter::new(config).expect("valid config"));
        writer.start().expect("writer should start");
        Self {
            writer,
            temp_dir: TempDir::new().expect("Failed to create temporary directory"),
        }
    }

    fn with_interval(batch_interval: Duration) -> Self {
        Self::new(WriterConfig::default().with_batch_interval(batch_interval))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    fn spawn_write(
        &self,
        name: &str,
        data: Vec<u8>,
        priority: WritePriority,
    ) -> JoinHandle<Result<(), WriterError>> {
        let writer = Arc::clone(&self.writer);
        let path = self.path(name);
        tokio::spawn(async move { writer.write(path, data, priority).await })
    }
}

#[tokio::test]
async fn immediate_write_contents_match_exactly() {
    let ctx = TestContext::with_interval(NEVER);
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    assert_ok!(
        ctx.writer
            .write(ctx.path("deep/dir/blob.bin"), payload.clone(), WritePriority::Immediate)
            .await
    );

    assert_eq!(std::fs::read(ctx.path("deep/dir/blob.bin")).unwrap(), payload);
    assert_ok!(ctx.writer.shutdown().await);
}

#[tokio::test]
async fn batched_writes_to_one_path_coalesce_to_last() {
    let ctx = TestContext::with_interval(NEVER);
    const N: usize = 5;

    let mut handles = Vec::new();
    for i in 0..N {
        handles.push(ctx.spawn_write("same.txt", format!("version {}", i).into_bytes(), WritePriority::Batched));
        if i == 0 {
            // Let the first request reach the pending index before the next one.
            assert!(wait_until(Duration::from_secs(2), || ctx.writer.metrics().total_requests == 1).await);
            tokio::time::sleep(Duration::from_millis(50)).await;
        } else {
            let expected = i as u64;
            assert!(
                wait_until(Duration::from_secs(2), || ctx.writer.metrics().coalesced_writes == expected).await,
                "request {} was not coalesced",
                i
            );
        }
    }

    let last = handles.pop().unwrap();

    // Superseded requests resolve successfully before anything hits the disk.
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert!(!ctx.path("same.txt").exists());
    assert!(!last.is_finished());

    let before = ctx.writer.metrics();
    assert_eq!(before.coalesced_writes, (N - 1) as u64);
    assert_eq!(before.batched_writes, 0);

    assert_ok!(ctx.writer.shutdown().await);
    assert_ok!(last.await.unwrap());

    assert_eq!(
        std::fs::read_to_string(ctx.path("same.txt")).unwrap(),
        format!("version {}", N - 1)
    );
    let after = ctx.writer.metrics();
    assert_eq!(after.batched_writes, before.batched_writes + 1);
    assert_eq!(after.coalesced_writes, (N - 1) as u64);
}

#[tokio::test]
async fn write_after_shutdown_is_rejected_without_io() {
    let ctx = TestContext::with_interval(Duration::from_millis(20));
    assert_ok!(ctx.writer.shutdown().await);

    for priority in [WritePriority::Immediate, WritePriority::Batched, WritePriority::OnShutdown] {
        let result = ctx.writer.write(ctx.path("late.txt"), "late", priority).await;
        assert!(matches!(result, Err(WriterError::ShuttingDown)));
    }

    assert!(!ctx.path("late.txt").exists());
    let snapshot = ctx.writer.metrics();
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.immediate_writes + snapshot.batched_writes, 0);
}

#[tokio::test]
async fn on_shutdown_write_lands_during_drain() {
    let ctx = TestContext::with_interval(NEVER);

    let handle = ctx.spawn_write("final.json", b"{\"done\":true}".to_vec(), WritePriority::OnShutdown);
    assert!(wait_until(Duration::from_secs(2), || ctx.writer.metrics().total_requests == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!ctx.path("final.json").exists());
    assert_eq!(ctx.writer.metrics().flushes, 0);

    assert_ok!(ctx.writer.shutdown().await);
    assert_ok!(handle.await.unwrap());

    assert_eq!(std::fs::read(ctx.path("final.json")).unwrap(), b"{\"done\":true}");
    assert_eq!(ctx.writer.state(), WriterState::Terminated);
}

#[tokio::test]
async fn on_shutdown_is_also_flushed_periodically() {
    let ctx = TestContext::with_interval(Duration::from_millis(20));

    assert_ok!(
        ctx.writer
            .write(ctx.path("early.txt"), "early", WritePriority::OnShutdown)
            .await
    );

    // Resolved by the timer while the writer is still running.
    assert!(ctx.writer.is_running());
    assert_eq!(std::fs::read_to_string(ctx.path("early.txt")).unwrap(), "early");
    assert_ok!(ctx.writer.shutdown().await);
}

#[tokio::test]
async fn blocked_worker_makes_shutdown_time_out() {
    init_test_logger();
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(SlowSink::new(Duration::from_secs(30)));
    let writer = Arc::new(
        AsyncWriter::with_sink(
            WriterConfig::default().with_shutdown_timeout(Duration::from_millis(100)),
            sink.clone(),
        )
        .unwrap(),
    );
    writer.start().unwrap();

    let stuck = {
        let writer = Arc::clone(&writer);
        let path = temp_dir.path().join("stuck.bin");
        tokio::spawn(async move { writer.write(path, "stuck", WritePriority::Immediate).await })
    };
    assert!(wait_until(Duration::from_secs(2), || sink.writes_started() == 1).await);

    let started = Instant::now();
    let result = writer.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(result, Err(WriterError::ShutdownTimeout(t)) if t == Duration::from_millis(100)));
    assert_eq!(writer.state(), WriterState::Terminated);

    // The parked submitter is released rather than left hanging.
    let outcome = tokio::time::timeout(Duration::from_secs(2), stuck)
        .await
        .expect("submitter should be unblocked")
        .unwrap();
    assert!(matches!(outcome, Err(WriterError::ShuttingDown)));
}

#[tokio::test]
async fn concurrent_shutdowns_both_wait_for_the_drain() {
    init_test_logger();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("final.txt");
    let sink = Arc::new(SlowSink::new(Duration::from_millis(300)));
    let writer = Arc::new(
        AsyncWriter::with_sink(WriterConfig::default().with_batch_interval(NEVER), sink.clone())
            .unwrap(),
    );
    writer.start().unwrap();

    let pending = {
        let writer = Arc::clone(&writer);
        let path = path.clone();
        tokio::spawn(async move { writer.write(path, "last words", WritePriority::OnShutdown).await })
    };
    assert!(wait_until(Duration::from_secs(2), || writer.metrics().total_requests == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let owner = {
        let writer = Arc::clone(&writer);
        tokio::spawn(async move { writer.shutdown().await })
    };
    assert!(wait_until(Duration::from_secs(2), || sink.writes_started() == 1).await);

    // A caller with a shorter bound gives up without cancelling the drain.
    let impatient = writer.shutdown_with_timeout(Duration::from_millis(20)).await;
    assert!(matches!(impatient, Err(WriterError::ShutdownTimeout(t)) if t == Duration::from_millis(20)));
    assert_eq!(writer.state(), WriterState::Draining);

    // A second caller only returns once the drain has written the file.
    assert_ok!(writer.shutdown().await);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "last words");
    assert_eq!(writer.state(), WriterState::Terminated);

    assert_ok!(owner.await.unwrap());
    assert_ok!(pending.await.unwrap());
}

#[tokio::test]
async fn full_queue_holds_submitters_back() {
    init_test_logger();
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(GatedSink::new());
    let writer = Arc::new(
        AsyncWriter::with_sink(
            WriterConfig::default()
                .with_batch_interval(NEVER)
                .with_channel_buffer(1),
            sink.clone(),
        )
        .unwrap(),
    );
    writer.start().unwrap();

    let submit = |name: &str| {
        let writer = Arc::clone(&writer);
        let path = temp_dir.path().join(name);
        tokio::spawn(async move { writer.write(path, "payload", WritePriority::Immediate).await })
    };

    // The first request occupies the worker, the second takes the only queue slot.
    let in_sink = submit("in_sink.txt");
    assert!(wait_until(Duration::from_secs(2), || sink.writes_started() == 1).await);
    let queued = submit("queued.txt");
    assert!(wait_until(Duration::from_secs(2), || writer.metrics().total_requests == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let overflow = submit("overflow.txt");
    assert!(wait_until(Duration::from_secs(2), || writer.metrics().total_requests == 3).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!overflow.is_finished());

    // Cancelling the blocked submitter shows it never got into the queue.
    overflow.abort();
    assert!(overflow.await.unwrap_err().is_cancelled());

    sink.release(2);
    assert_ok!(in_sink.await.unwrap());
    assert_ok!(queued.await.unwrap());
    assert_ok!(writer.shutdown().await);

    assert!(temp_dir.path().join("queued.txt").exists());
    assert!(!temp_dir.path().join("overflow.txt").exists());
    assert_eq!(sink.writes_started(), 2);
    assert_eq!(writer.metrics().immediate_writes, 2);
}

#[tokio::test]
async fn total_requests_counts_every_call() {
    let ctx = TestContext::with_interval(Duration::from_millis(20));
    std::fs::write(ctx.path("occupied"), b"file").unwrap();

    assert_ok!(ctx.writer.write(ctx.path("ok.txt"), "ok", WritePriority::Immediate).await);
    assert_ok!(ctx.writer.write(ctx.path("later.txt"), "later", WritePriority::Batched).await);
    let failed = assert_err!(
        ctx.writer
            .write(ctx.path("occupied/child.txt"), "fails", WritePriority::Immediate)
            .await
    );
    assert!(matches!(failed, WriterError::Io { .. }));
    assert_ok!(ctx.writer.shutdown().await);
    let rejected =
        assert_err!(ctx.writer.write(ctx.path("rejected.txt"), "no", WritePriority::Immediate).await);
    assert!(rejected.is_rejected());

    let snapshot = ctx.writer.metrics();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.immediate_writes, 2);
    assert_eq!(snapshot.batched_writes, 1);
    assert_eq!(snapshot.errors, 1);
}

#[tokio::test]
async fn io_error_goes_only_to_the_written_request() {
    let ctx = TestContext::with_interval(NEVER);
    std::fs::write(ctx.path("occupied"), b"file").unwrap();

    let first = ctx.spawn_write("occupied/x.txt", b"first".to_vec(), WritePriority::Batched);
    assert!(wait_until(Duration::from_secs(2), || ctx.writer.metrics().total_requests == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = ctx.spawn_write("occupied/x.txt", b"second".to_vec(), WritePriority::Batched);

    assert!(wait_until(Duration::from_secs(2), || ctx.writer.metrics().coalesced_writes == 1).await);
    assert_ok!(first.await.unwrap());

    assert_ok!(ctx.writer.shutdown().await);
    let result = second.await.unwrap();
    assert!(matches!(result, Err(WriterError::Io { .. })));
    assert_eq!(ctx.writer.metrics().errors, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_resolve_exactly_once() {
    let ctx = TestContext::new(
        WriterConfig::default()
            .with_batch_interval(Duration::from_millis(10))
            .with_channel_buffer(1),
    );
    const TASKS: usize = 64;
    const PATHS: usize = 8;

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            ctx.spawn_write(
                &format!("shard-{}.txt", i % PATHS),
                format!("{}", i).into_bytes(),
                WritePriority::Batched,
            )
        })
        .collect();

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_ok!(ctx.writer.shutdown().await);

    let snapshot = ctx.writer.metrics();
    assert_eq!(snapshot.total_requests, TASKS as u64);
    // Each request was either superseded or physically written, never both.
    assert_eq!(snapshot.coalesced_writes + snapshot.batched_writes, TASKS as u64);
    assert_eq!(snapshot.errors, 0);

    for p in 0..PATHS {
        let content = std::fs::read_to_string(ctx.path(&format!("shard-{}.txt", p))).unwrap();
        let written: usize = content.parse().unwrap();
        assert_eq!(written % PATHS, p);
    }
}

#[tokio::test]
async fn immediate_and_batched_mix_across_paths() {
    let ctx = TestContext::with_interval(Duration::from_millis(25));

    let deferred = ctx.spawn_write("thumb.png", vec![9u8; 128], WritePriority::Batched);
    assert_ok!(
        ctx.writer
            .write(ctx.path("meta.json"), "{}", WritePriority::Immediate)
            .await
    );
    assert!(ctx.path("meta.json").exists());

    assert_ok!(deferred.await.unwrap());
    assert_eq!(std::fs::read(ctx.path("thumb.png")).unwrap(), vec![9u8; 128]);

    assert_ok!(ctx.writer.shutdown().await);
    let snapshot = ctx.writer.metrics();
    assert_eq!(snapshot.immediate_writes, 1);
    assert_eq!(snapshot.batched_writes, 1);
    assert_eq!(snapshot.bytes_written, 130);
}
