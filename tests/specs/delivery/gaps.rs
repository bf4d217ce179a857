//! A slow writer never stalls the operations log

use crate::prelude::*;

#[tokio::test]
async fn later_rows_are_delivered_before_a_slow_commit() {
    let store = MemoryLogStore::new();
    let shard = Shard::new("A");
    insert_and_commit(&store, &shard, "op-1").await;
    insert_and_commit(&store, &shard, "op-2").await;
    let (slow, index) = insert_operation(&store, &shard, "op-3").await;
    assert_eq!(index, 3);
    insert_and_commit(&store, &shard, "op-4").await;

    let handler = RecordingOperationHandler::new();
    let settings = operation_settings(ms(20)).with_batch_size(2);
    let mut workers = ShardWorkers::new();
    workers.spawn_operation_reader(
        OperationLogReader::new(store.clone(), LocalLogWatcher::new(), handler.clone(), SystemClock, settings),
        [shard.clone()],
    );

    assert!(handler.wait_for(3, WAIT).await);
    let mut delivered = handler.indices();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![1, 2, 4]);

    slow.commit().await.unwrap();
    assert!(handler.wait_for(4, WAIT).await);
    assert_eq!(handler.indices().last(), Some(&3));

    assert_eq!(workers.shutdown(WAIT).await, 0);
}

#[tokio::test]
async fn rolled_back_index_is_skipped() {
    let store = MemoryLogStore::new();
    let shard = Shard::new("A");
    insert_and_commit(&store, &shard, "op-1").await;
    let (aborted, _) = insert_operation(&store, &shard, "op-2").await;
    aborted.rollback().await.unwrap();
    insert_and_commit(&store, &shard, "op-3").await;

    let handler = RecordingOperationHandler::new();
    let settings = operation_settings(ms(20))
        .with_reprocess(RandomDuration::fixed(ms(5)), 3, RetryDelays::new(ms(5), ms(10)));
    let reader = OperationLogReader::new(store.clone(), LocalLogWatcher::new(), handler.clone(), SystemClock, settings);

    reader.process_batch(&shard).await.unwrap();
    assert_eq!(reader.drain(WAIT).await, 0);

    let mut delivered = handler.indices();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![1, 3]);
    assert_eq!(reader.shard_state(&shard).next_index(), Some(4));
}

async fn insert_and_commit(store: &MemoryLogStore, shard: &Shard, id: &str) {
    let (tx, _) = insert_operation(store, shard, id).await;
    tx.commit().await.unwrap();
}
