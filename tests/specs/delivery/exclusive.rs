//! Events are handled by exactly one host; operations by every host

use crate::prelude::*;
use std::collections::HashSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_event_is_claimed_by_exactly_one_host() {
    let store = MemoryLogStore::new();
    let markers = tempfile::tempdir().unwrap();
    let shard = Shard::new("orders");
    let hosts: Vec<Host> = (0..3)
        .map(|i| Host::start(&format!("host-{i}"), &store, markers.path(), &[shard.clone()], ms(200)))
        .collect();
    for host in &hosts {
        host.events.set_delay(ms(2));
    }

    for i in 0..20 {
        let writer = &hosts[i % hosts.len()];
        writer
            .commit(&shard, json!({"order": i}), vec![OperationEvent::new(format!("evt-{i}"), json!(i))])
            .await;
    }

    let all_handled = eventually(WAIT, || hosts.iter().map(|h| h.events.handled().len()).sum::<usize>() >= 20).await;
    assert!(all_handled);

    let mut claimed: Vec<String> = hosts.iter().flat_map(|h| h.events.uuids()).collect();
    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(unique.len(), claimed.len(), "an event was handled twice: {claimed:?}");
    claimed.sort();
    assert_eq!(claimed.len(), 20);
    assert!(store
        .events(&shard, LogKind::Events)
        .iter()
        .all(|e| e.state == LogEntryState::Processed));

    for host in &hosts {
        assert!(host.operations.wait_for(20, WAIT).await, "{} missed operations", host.id);
    }
    for host in hosts {
        assert_eq!(host.stop().await, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claims_transition_once() {
    let store = MemoryLogStore::new();
    let shard = Shard::NONE;
    let mut tx = store.begin(&shard, IsolationLevel::ReadCommitted).await.unwrap();
    let event = OperationEvent::new("only", json!("x"));
    tx.insert_event(oplog_core::EventEntry::from_event(&event, chrono::Utc::now()))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let handler = RecordingEventHandler::new();
    handler.set_delay(ms(20));
    let mut racers = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let reader = EventLogReader::events(
            store.clone(),
            LocalLogWatcher::new(),
            handler.clone(),
            SystemClock,
            event_settings(Duration::from_secs(3600)),
        );
        let shard = shard.clone();
        racers.spawn(async move { reader.process_batch(&shard).await.unwrap().processed });
    }
    let mut processed = 0;
    while let Some(joined) = racers.join_next().await {
        processed += joined.unwrap();
    }

    assert_eq!(processed, 1);
    assert_eq!(handler.uuids(), vec!["only"]);
    let row = store.events(&shard, LogKind::Events).remove(0);
    assert_eq!((row.state, row.version), (LogEntryState::Processed, 2));
}
