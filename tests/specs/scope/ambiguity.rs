//! A commit whose acknowledgement is lost is not repeated

use crate::prelude::*;

fn scopes(store: &MemoryLogStore) -> ScopeFactory<MemoryLogStore, SystemClock, UuidIdGen> {
    ScopeFactory::new(store.clone(), SystemClock, UuidIdGen, HostId::new("h1"))
}

#[tokio::test]
async fn lost_acknowledgement_counts_as_committed() {
    let store = MemoryLogStore::new();
    let shard = Shard::new("a");
    store.fail_next_commit_after_apply(StoreError::CommitFailed("connection reset after commit".into()));

    let mut scope = scopes(&store).begin();
    scope.transaction(&shard).await.unwrap();
    scope.set_command(json!("pay"));
    scope.add_event(OperationEvent::new("receipt", json!(1)));
    scope.commit().await.unwrap();

    assert!(scope.is_committed());
    assert!(scope.confirm_commit().await.unwrap());
    assert_eq!(store.operations(&shard).len(), 1);
    assert_eq!(store.events(&shard, LogKind::Events).len(), 1);
}

#[tokio::test]
async fn unverified_commit_is_confirmed_later_without_duplicates() {
    let store = MemoryLogStore::new();
    let shard = Shard::new("a");
    store.fail_next_commit_after_apply(StoreError::CommitFailed("ack lost".into()));
    store.fail_next_read(StoreError::Connection("still down".into()));

    let mut scope = scopes(&store).begin();
    scope.transaction(&shard).await.unwrap();
    scope.set_command(json!("pay"));

    let err = scope.commit().await.unwrap_err();
    assert!(scope.is_transient_failure(&err));

    assert!(scope.confirm_commit().await.unwrap());
    assert_eq!(scope.operation().index, Some(1));
    assert_eq!(store.operations(&shard).len(), 1);
    assert_eq!(store.last_index(&shard), 1);
}

#[tokio::test]
async fn failed_commit_is_not_confirmed() {
    let store = MemoryLogStore::new();
    let shard = Shard::new("a");
    store.fail_next_commit(StoreError::Connection("reset".into()));

    let mut scope = scopes(&store).begin();
    scope.transaction(&shard).await.unwrap();
    scope.set_command(json!("pay"));

    assert!(scope.commit().await.is_err());
    assert!(!scope.confirm_commit().await.unwrap());
    assert!(store.operations(&shard).is_empty());
}
