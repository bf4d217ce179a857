//! Shared fixtures for the behavioral specs

#![allow(dead_code, unused_imports)]

pub use oplog_adapters::{FileLogWatcher, FileTouchNotifier, LocalLogWatcher, LogWatcher};
pub use oplog_core::{
    CompletionSettings, EventReaderSettings, FileWatcherSettings, HostId, IsolationLevel, LogEntryState, LogKind,
    Operation, OperationEntry, OperationEvent, OperationReaderSettings, RandomDuration, RetryDelays, Shard,
    SystemClock, TrimmerSettings, UuidIdGen,
};
pub use oplog_engine::fake::{RecordingEventHandler, RecordingOperationHandler, Scripted};
pub use oplog_engine::{
    CompletionListener, EventLogReader, LogTrimmer, LogWatchers, OperationLogReader, ScopeFactory, ShardWorkers,
};
pub use oplog_storage::{LogStore, LogTransaction, MemoryLogStore, StoreError};
pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn operation_settings(check_period: Duration) -> OperationReaderSettings {
    OperationReaderSettings::default()
        .with_batch_size(8)
        .with_concurrency_level(4)
        .with_check_period(RandomDuration::fixed(check_period))
        .with_reprocess(RandomDuration::fixed(ms(10)), 50, RetryDelays::new(ms(10), ms(50)))
        .with_retry_delays(RetryDelays::new(ms(10), ms(50)))
}

pub fn event_settings(check_period: Duration) -> EventReaderSettings {
    EventReaderSettings::default()
        .with_batch_size(4)
        .with_concurrency_level(2)
        .with_check_period(RandomDuration::fixed(check_period))
        .with_reprocess(RandomDuration::fixed(ms(10)), 5, RetryDelays::new(ms(10), ms(20)))
        .with_busy_delay(ms(10))
        .with_retry_delays(RetryDelays::new(ms(10), ms(50)))
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(ms(10)).await;
    }
    condition()
}

type Watchers = LogWatchers<FileLogWatcher>;

/// One application process: its scopes, readers and recording handlers.
///
/// Hosts share the store and a marker directory, like processes sharing a
/// database and a filesystem.
pub struct Host {
    pub id: HostId,
    pub scopes: ScopeFactory<MemoryLogStore, SystemClock, UuidIdGen>,
    pub watchers: Watchers,
    pub operations: RecordingOperationHandler,
    pub events: RecordingEventHandler,
    pub workers: ShardWorkers,
}

impl Host {
    pub fn start(name: &str, store: &MemoryLogStore, marker_dir: &std::path::Path, shards: &[Shard], check_period: Duration) -> Self {
        let id = HostId::new(name);
        let watcher_settings = FileWatcherSettings {
            marker_dir: Some(marker_dir.to_path_buf()),
            poll_interval: ms(10),
        };
        let watchers = LogWatchers::new(
            FileLogWatcher::with_settings(marker_dir, LogKind::Operations, &watcher_settings),
            FileLogWatcher::with_settings(marker_dir, LogKind::Events, &watcher_settings),
            FileLogWatcher::with_settings(marker_dir, LogKind::Timers, &watcher_settings),
        );
        let listener = CompletionListener::new(
            id.clone(),
            watchers.clone(),
            FileTouchNotifier::new(marker_dir),
            CompletionSettings::default(),
        );
        let scopes = ScopeFactory::new(store.clone(), SystemClock, UuidIdGen, id.clone()).with_listener(Arc::new(listener));

        let operations = RecordingOperationHandler::new();
        let events = RecordingEventHandler::new();
        let mut workers = ShardWorkers::new();
        workers.spawn_operation_reader(
            OperationLogReader::new(
                store.clone(),
                watchers.operations.clone(),
                operations.clone(),
                SystemClock,
                operation_settings(check_period),
            ),
            shards.iter().cloned(),
        );
        workers.spawn_event_reader(
            EventLogReader::events(
                store.clone(),
                watchers.events.clone(),
                events.clone(),
                SystemClock,
                event_settings(check_period),
            ),
            shards.iter().cloned(),
        );

        Self {
            id,
            scopes,
            watchers,
            operations,
            events,
            workers,
        }
    }

    /// Run one operation on `shard` that emits `events`
    pub async fn commit(&self, shard: &Shard, command: serde_json::Value, events: Vec<OperationEvent>) -> Operation {
        let mut scope = self.scopes.begin();
        scope.transaction(shard).await.unwrap();
        scope.set_command(command);
        for event in events {
            scope.add_event(event);
        }
        scope.commit().await.unwrap();
        scope.operation().clone()
    }

    pub async fn stop(self) -> usize {
        self.workers.shutdown(WAIT).await
    }
}

/// Insert an operation row in its own transaction, leaving it uncommitted
pub async fn insert_operation(
    store: &MemoryLogStore,
    shard: &Shard,
    id: &str,
) -> (<MemoryLogStore as LogStore>::Tx, u64) {
    let now = chrono::Utc::now();
    let op = Operation::new(id, HostId::new("writer"), now).with_command(json!(id));
    let mut tx = store.begin(shard, IsolationLevel::ReadCommitted).await.unwrap();
    let index = tx
        .insert_operation(OperationEntry::from_operation(&op, now).unwrap())
        .await
        .unwrap();
    (tx, index)
}
