//! Change signals reach waiters in this and other processes

use crate::prelude::*;

#[tokio::test]
async fn waiter_started_before_notify_is_woken() {
    let watcher = LocalLogWatcher::new();
    let shard = Shard::new("a");

    let waiter = watcher.when_changed(&shard);
    let notifier = watcher.clone();
    let signal = shard.clone();
    tokio::spawn(async move { notifier.notify_changed(&signal).await.unwrap() });

    tokio::time::timeout(WAIT, waiter.changed()).await.unwrap();
}

#[tokio::test]
async fn waiter_started_after_notify_waits_for_the_next_one() {
    let watcher = LocalLogWatcher::new();
    let shard = Shard::new("a");
    watcher.notify_changed(&shard).await.unwrap();

    let waiter = watcher.when_changed(&shard);
    assert!(!waiter.has_changed());
    assert!(tokio::time::timeout(ms(50), watcher.when_changed(&shard).changed())
        .await
        .is_err());

    watcher.notify_changed(&shard).await.unwrap();
    tokio::time::timeout(WAIT, waiter.changed()).await.unwrap();
}

#[tokio::test]
async fn marker_files_wake_other_processes() {
    let dir = tempfile::tempdir().unwrap();
    let settings = FileWatcherSettings {
        marker_dir: Some(dir.path().to_path_buf()),
        poll_interval: ms(10),
    };
    let writer = FileLogWatcher::with_settings(dir.path(), LogKind::Operations, &settings);
    let reader = FileLogWatcher::with_settings(dir.path(), LogKind::Operations, &settings);
    let shard = Shard::new("a");

    let waiter = reader.when_changed(&shard);
    // Let the reader's poller record the marker's initial state
    tokio::time::sleep(ms(50)).await;
    writer.notify_changed(&shard).await.unwrap();

    tokio::time::timeout(WAIT, waiter.changed()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_on_one_host_wakes_the_other_without_polling() {
    let store = MemoryLogStore::new();
    let markers = tempfile::tempdir().unwrap();
    let shard = Shard::new("a");
    // Forced checks are effectively off, so only marker signals deliver
    let writer = Host::start("writer", &store, markers.path(), &[shard.clone()], Duration::from_secs(3600));
    let observer = Host::start("observer", &store, markers.path(), &[shard.clone()], Duration::from_secs(3600));
    tokio::time::sleep(ms(100)).await;

    let op = writer.commit(&shard, json!("invalidate"), vec![]).await;

    assert!(observer.operations.wait_for(1, WAIT).await);
    assert_eq!(observer.operations.handled()[0].id, op.id);
    assert!(writer.operations.wait_for(1, WAIT).await);

    assert_eq!(writer.stop().await, 0);
    assert_eq!(observer.stop().await, 0);
}
