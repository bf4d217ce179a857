//! Trimming never removes work that is pending or in flight

use crate::prelude::*;
use oplog_core::{Clock, FakeClock};

#[tokio::test]
async fn trim_spares_new_and_claimed_rows() {
    let store = MemoryLogStore::new();
    let clock = FakeClock::new();
    let shard = Shard::new("a");
    for uuid in ["pending", "claimed", "done"] {
        let mut tx = store.begin(&shard, IsolationLevel::ReadCommitted).await.unwrap();
        let entry = oplog_core::EventEntry::from_event(&OperationEvent::new(uuid, json!(uuid)), clock.now());
        tx.insert_event(entry).await.unwrap();
        tx.commit().await.unwrap();
    }
    for uuid in ["claimed", "done"] {
        let mut tx = store.begin(&shard, IsolationLevel::ReadCommitted).await.unwrap();
        let row = tx.lock_event(LogKind::Events, uuid).await.unwrap().unwrap();
        tx.set_event_state(LogKind::Events, uuid, row.version, LogEntryState::Processed)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    clock.advance(Duration::from_secs(2 * 3600));

    let mut in_flight = store.begin(&shard, IsolationLevel::ReadCommitted).await.unwrap();
    in_flight.lock_event(LogKind::Events, "claimed").await.unwrap();

    let trimmer = LogTrimmer::new(LogKind::Events, store.clone(), clock.clone(), TrimmerSettings::default());
    assert_eq!(trimmer.trim(&shard).await.unwrap(), 1);

    let mut left: Vec<_> = store.events(&shard, LogKind::Events).into_iter().map(|e| e.uuid).collect();
    left.sort();
    assert_eq!(left, vec!["claimed", "pending"]);

    in_flight.rollback().await.unwrap();
    assert_eq!(trimmer.trim(&shard).await.unwrap(), 1);
}

#[tokio::test]
async fn operations_inside_retention_are_kept() {
    let store = MemoryLogStore::new();
    let clock = FakeClock::new();
    let shard = Shard::NONE;
    let scopes = ScopeFactory::new(store.clone(), clock.clone(), UuidIdGen, HostId::new("h1"));
    for minutes in [0u64, 20, 40] {
        clock.set(chrono::Utc::now() + chrono::Duration::minutes(minutes as i64));
        let mut scope = scopes.begin();
        scope.transaction(&shard).await.unwrap();
        scope.set_command(json!(minutes));
        scope.commit().await.unwrap();
    }

    let trimmer = LogTrimmer::new(LogKind::Operations, store.clone(), clock.clone(), TrimmerSettings::default());
    assert_eq!(trimmer.trim(&shard).await.unwrap(), 1);
    assert_eq!(store.operations(&shard).len(), 2);
    assert_eq!(trimmer.report_statistics(&shard).await.unwrap().total, 2);
}
