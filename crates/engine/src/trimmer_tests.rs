// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oplog_core::{EventEntry, FakeClock, HostId, LogEntryState, Operation, OperationEntry, OperationEvent};
use oplog_storage::{MemoryLogStore, StoreError};
use serde_json::json;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

struct Fixture {
    store: MemoryLogStore,
    clock: FakeClock,
    shard: Shard,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: MemoryLogStore::new(),
            clock: FakeClock::new(),
            shard: Shard::new("a"),
        }
    }

    fn trimmer(&self, kind: LogKind, settings: TrimmerSettings) -> LogTrimmer<MemoryLogStore, FakeClock> {
        LogTrimmer::new(kind, self.store.clone(), self.clock.clone(), settings)
    }

    async fn log_operation(&self, id: &str) {
        let op = Operation::new(id, HostId::new("h1"), self.clock.now()).with_command(json!(id));
        let mut tx = self.store.begin(&self.shard, IsolationLevel::ReadCommitted).await.unwrap();
        tx.insert_operation(OperationEntry::from_operation(&op, self.clock.now()).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    async fn log_event(&self, uuid: &str, state: LogEntryState) {
        let mut tx = self.store.begin(&self.shard, IsolationLevel::ReadCommitted).await.unwrap();
        let entry = EventEntry::from_event(&OperationEvent::new(uuid, json!(uuid)), self.clock.now());
        tx.insert_event(entry).await.unwrap();
        tx.commit().await.unwrap();
        if state != LogEntryState::New {
            let mut tx = self.store.begin(&self.shard, IsolationLevel::ReadCommitted).await.unwrap();
            let row = tx.lock_event(LogKind::Events, uuid).await.unwrap().unwrap();
            tx.set_event_state(LogKind::Events, uuid, row.version, state).await.unwrap();
            tx.commit().await.unwrap();
        }
    }

    fn event_uuids(&self) -> Vec<String> {
        self.store
            .events(&self.shard, LogKind::Events)
            .into_iter()
            .map(|e| e.uuid)
            .collect()
    }
}

#[tokio::test]
async fn operations_past_retention_are_deleted() {
    let f = Fixture::new();
    f.log_operation("old").await;
    f.clock.advance(31 * MINUTE);
    f.log_operation("fresh").await;

    let deleted = f.trimmer(LogKind::Operations, TrimmerSettings::default()).trim(&f.shard).await.unwrap();

    assert_eq!(deleted, 1);
    let left: Vec<_> = f.store.operations(&f.shard).into_iter().map(|e| e.uuid).collect();
    assert_eq!(left, vec!["fresh"]);
}

#[tokio::test]
async fn trim_repeats_until_a_short_batch() {
    let f = Fixture::new();
    for i in 0..5 {
        f.log_operation(&format!("op-{i}")).await;
    }
    f.clock.advance(MINUTE);
    let settings = TrimmerSettings::default().with_max_entry_age(Duration::from_secs(1)).with_batch_size(2);
    let trimmer = f.trimmer(LogKind::Operations, settings);

    assert_eq!(trimmer.trim_batch(&f.shard).await.unwrap(), 2);
    assert_eq!(trimmer.trim(&f.shard).await.unwrap(), 3);
    assert!(f.store.operations(&f.shard).is_empty());
}

#[tokio::test]
async fn new_events_are_never_trimmed() {
    let f = Fixture::new();
    f.log_event("new", LogEntryState::New).await;
    f.log_event("done", LogEntryState::Processed).await;
    f.log_event("dropped", LogEntryState::Discarded).await;
    f.clock.advance(61 * MINUTE);
    f.log_event("recent", LogEntryState::Processed).await;

    let deleted = f.trimmer(LogKind::Events, TrimmerSettings::default()).trim(&f.shard).await.unwrap();

    assert_eq!(deleted, 2);
    let mut left = f.event_uuids();
    left.sort();
    assert_eq!(left, vec!["new", "recent"]);
}

#[tokio::test]
async fn locked_rows_are_skipped() {
    let f = Fixture::new();
    f.log_event("held", LogEntryState::Processed).await;
    f.log_event("free", LogEntryState::Processed).await;
    f.clock.advance(61 * MINUTE);

    let mut claim = f.store.begin(&f.shard, IsolationLevel::ReadCommitted).await.unwrap();
    claim.lock_event(LogKind::Events, "held").await.unwrap();

    let trimmer = f.trimmer(LogKind::Events, TrimmerSettings::default());
    assert_eq!(trimmer.trim(&f.shard).await.unwrap(), 1);
    assert_eq!(f.event_uuids(), vec!["held"]);

    claim.rollback().await.unwrap();
    assert_eq!(trimmer.trim(&f.shard).await.unwrap(), 1);
}

#[tokio::test]
async fn statistics_break_down_event_states() {
    let f = Fixture::new();
    f.log_event("pending", LogEntryState::New).await;
    f.log_event("done", LogEntryState::Processed).await;
    f.log_event("dropped", LogEntryState::Discarded).await;

    let stats = f
        .trimmer(LogKind::Events, TrimmerSettings::default())
        .report_statistics(&f.shard)
        .await
        .unwrap();

    assert_eq!(stats.total, 3);
    assert_eq!((stats.pending, stats.processed, stats.discarded), (1, 1, 1));
}

#[tokio::test]
async fn statistics_failure_is_reported() {
    let f = Fixture::new();
    f.store.fail_next_read(StoreError::Connection("reset".into()));

    let trimmer = f.trimmer(LogKind::Operations, TrimmerSettings::default());
    assert!(trimmer.report_statistics(&f.shard).await.is_err());
    assert_eq!(trimmer.report_statistics(&f.shard).await.unwrap().total, 0);
}

#[tokio::test]
async fn run_stops_on_cancel_during_initial_delay() {
    let f = Fixture::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    f.trimmer(LogKind::Operations, TrimmerSettings::default())
        .run(f.shard.clone(), cancel.clone())
        .await;
    f.trimmer(LogKind::Operations, TrimmerSettings::default())
        .run_statistics(f.shard.clone(), cancel)
        .await;
}
