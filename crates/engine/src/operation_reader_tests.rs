// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::HandlerError;
use crate::fake::{RecordingOperationHandler, Scripted};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use oplog_adapters::LocalLogWatcher;
use oplog_core::{FakeClock, HostId, IsolationLevel, Operation, RandomDuration, RetryDelays};
use oplog_storage::{LogTransaction, MemoryLogStore, MemoryTransaction, StoreError};
use serde_json::json;

type Reader = OperationLogReader<MemoryLogStore, LocalLogWatcher, RecordingOperationHandler, FakeClock>;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn settings() -> OperationReaderSettings {
    OperationReaderSettings::default()
        .with_batch_size(2)
        .with_concurrency_level(2)
        .with_check_period(RandomDuration::fixed(Duration::from_secs(3600)))
        .with_reprocess(RandomDuration::fixed(ms(5)), 20, RetryDelays::new(ms(5), ms(10)))
        .with_retry_delays(RetryDelays::new(ms(5), ms(10)))
}

struct Fixture {
    store: MemoryLogStore,
    clock: FakeClock,
    watcher: LocalLogWatcher,
    handler: RecordingOperationHandler,
    reader: Reader,
    shard: Shard,
}

fn fixture(settings: OperationReaderSettings) -> Fixture {
    let store = MemoryLogStore::new();
    let clock = FakeClock::new();
    let watcher = LocalLogWatcher::new();
    let handler = RecordingOperationHandler::new();
    let reader = OperationLogReader::new(store.clone(), watcher.clone(), handler.clone(), clock.clone(), settings);
    Fixture {
        store,
        clock,
        watcher,
        handler,
        reader,
        shard: Shard::new("A"),
    }
}

impl Fixture {
    /// Insert an operation row without committing it
    async fn insert(&self, id: &str) -> (MemoryTransaction, u64) {
        let op = Operation::new(id, HostId::new("h1"), self.clock.now()).with_command(json!(id));
        let mut tx = self.store.begin(&self.shard, IsolationLevel::ReadCommitted).await.unwrap();
        let entry = OperationEntry::from_operation(&op, self.clock.now()).unwrap();
        let index = tx.insert_operation(entry).await.unwrap();
        (tx, index)
    }

    async fn log(&self, id: &str) -> u64 {
        let (tx, index) = self.insert(id).await;
        tx.commit().await.unwrap();
        index
    }
}

#[tokio::test]
async fn gap_is_reprocessed_while_later_rows_dispatch() {
    let f = fixture(settings());
    f.log("op-1").await;
    f.log("op-2").await;
    let (slow, index) = f.insert("op-3").await;
    assert_eq!(index, 3);
    f.log("op-4").await;

    let first = f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!((first.read, first.processed, first.full), (2, 2, true));
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), Some(3));

    let second = f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!((second.read, second.processed, second.reprocessing), (1, 1, 1));
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), Some(5));
    assert!(f.reader.shard_state(&f.shard).reprocess().contains("3"));

    slow.commit().await.unwrap();
    assert!(f.handler.wait_for(4, Duration::from_secs(5)).await);

    let indices = f.handler.indices();
    let mut head = indices[..2].to_vec();
    head.sort_unstable();
    assert_eq!(head, vec![1, 2]);
    assert_eq!(indices[2..], [4, 3]);
    assert_eq!(f.reader.drain(Duration::from_secs(1)).await, 0);
}

#[tokio::test]
async fn fresh_cursor_skips_history() {
    let f = fixture(settings());
    f.log("old").await;
    f.clock.advance(Duration::from_secs(10));
    f.log("new").await;

    let outcome = f.reader.process_batch(&f.shard).await.unwrap();

    assert_eq!(outcome.processed, 1);
    assert_eq!(f.handler.indices(), vec![2]);
}

#[tokio::test]
async fn empty_log_keeps_searching_from_first_lookup() {
    let f = fixture(settings());
    let outcome = f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!(outcome, BatchOutcome::default());
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), None);

    f.clock.advance(Duration::from_secs(60));
    f.log("late").await;
    f.reader.process_batch(&f.shard).await.unwrap();

    assert_eq!(f.handler.indices(), vec![1]);
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), Some(2));
}

#[tokio::test]
async fn handler_failure_is_reprocessed() {
    let f = fixture(settings());
    f.handler.fail("op-1", Scripted::Transient, 2);
    f.log("op-1").await;

    let outcome = f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!((outcome.processed, outcome.reprocessing), (0, 1));
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), Some(2));

    assert!(f.handler.wait_for(1, Duration::from_secs(5)).await);
    assert_eq!(f.handler.attempts(), 3);
}

#[tokio::test]
async fn non_transient_failure_abandons_entry() {
    let f = fixture(settings());
    f.handler.fail("op-1", Scripted::Failed, 2);
    f.log("op-1").await;
    f.log("op-2").await;

    f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!(f.reader.drain(Duration::from_secs(5)).await, 0);

    assert_eq!(f.handler.indices(), vec![2]);
    assert_eq!(f.handler.attempts(), 3);
    assert!(f.reader.shard_state(&f.shard).reprocess().is_empty());
}

#[tokio::test]
async fn missing_index_is_skipped_after_attempts() {
    let settings = settings().with_reprocess(RandomDuration::fixed(ms(1)), 3, RetryDelays::new(ms(1), ms(2)));
    let f = fixture(settings);
    f.log("op-1").await;
    let (never, _) = f.insert("op-2").await;
    f.log("op-3").await;

    f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!(f.reader.drain(Duration::from_secs(5)).await, 0);

    let mut indices = f.handler.indices();
    indices.sort_unstable();
    assert_eq!(indices, vec![1, 3]);
    assert!(f.reader.shard_state(&f.shard).reprocess().is_empty());
    never.rollback().await.unwrap();
}

#[tokio::test]
async fn read_failure_leaves_cursor_in_place() {
    let f = fixture(settings());
    f.log("op-1").await;
    f.reader.process_batch(&f.shard).await.unwrap();
    f.log("op-2").await;

    f.store.fail_next_read(StoreError::Connection("reset".into()));
    assert!(f.reader.process_batch(&f.shard).await.is_err());
    assert_eq!(f.reader.shard_state(&f.shard).next_index(), Some(2));

    f.reader.process_batch(&f.shard).await.unwrap();
    assert_eq!(f.handler.indices(), vec![1, 2]);
}

#[tokio::test]
async fn run_wakes_on_watcher_signal() {
    let f = fixture(settings());
    let cancel = CancellationToken::new();
    let reader = f.reader.clone();
    let shard = f.shard.clone();
    let stop = cancel.clone();
    let task = tokio::spawn(async move { reader.run(shard, stop).await });

    // Let the loop run its first (empty) batch and start waiting
    tokio::time::sleep(ms(20)).await;
    f.log("op-1").await;
    f.watcher.notify_changed(&f.shard).await.unwrap();

    assert!(f.handler.wait_for(1, Duration::from_secs(5)).await);
    cancel.cancel();
    task.await.unwrap();
}

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn full_batch_is_logged_as_backlog() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let f = fixture(settings());
                f.log("op-1").await;
                f.log("op-2").await;
                f.log("op-3").await;
                f.reader.process_batch(&f.shard).await.unwrap();
                f.reader.process_batch(&f.shard).await.unwrap();
            })
    });

    let output = String::from_utf8_lossy(&logs.logs.lock().unwrap()).to_string();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains("full batch, log is behind"));
    assert!(output.contains("batch processed"));
    assert!(output.contains("shard=A"));
}

#[tokio::test]
async fn dispatch_fan_out_is_bounded_and_starts_in_index_order() {
    let f = fixture(settings().with_batch_size(8).with_concurrency_level(3));
    f.handler.set_delay(ms(10));
    for i in 1..=6 {
        f.log(&format!("op-{i}")).await;
    }

    let outcome = f.reader.process_batch(&f.shard).await.unwrap();

    assert_eq!(outcome.processed, 6);
    assert_eq!(f.handler.peak_in_flight(), 3);
    assert_eq!(f.handler.started_indices(), vec![1, 2, 3, 4, 5, 6]);
}

/// Panics on the first delivery of index 2
#[derive(Clone, Default)]
struct CrashesOnce {
    crashed: Arc<AtomicBool>,
    inner: RecordingOperationHandler,
}

#[async_trait]
impl OperationHandler for CrashesOnce {
    async fn handle(&self, shard: &Shard, operation: &Operation) -> Result<(), HandlerError> {
        if operation.index == Some(2) && !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("handler crashed on {}", operation.id);
        }
        self.inner.handle(shard, operation).await
    }
}

#[tokio::test]
async fn panicked_dispatch_is_reprocessed() {
    let f = fixture(settings());
    let handler = CrashesOnce::default();
    let settings = settings().with_batch_size(8);
    let reader = OperationLogReader::new(f.store.clone(), LocalLogWatcher::new(), handler.clone(), f.clock.clone(), settings);
    for i in 1..=3 {
        f.log(&format!("op-{i}")).await;
    }

    let outcome = reader.process_batch(&f.shard).await.unwrap();
    assert_eq!((outcome.processed, outcome.reprocessing), (2, 1));
    assert_eq!(reader.shard_state(&f.shard).next_index(), Some(4));

    assert_eq!(reader.drain(Duration::from_secs(5)).await, 0);
    let mut indices = handler.inner.indices();
    indices.sort();
    assert_eq!(indices, vec![1, 2, 3]);
}
