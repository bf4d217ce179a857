// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relational store contract

use crate::error::StoreError;
use crate::types::LogStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oplog_core::{EventEntry, IsolationLevel, LogEntryState, LogKind, OperationEntry, Shard};
use std::collections::HashSet;

/// A sharded database holding the operation, event and timer logs.
///
/// Reads on the store itself see committed data only and take no locks.
/// Everything that writes, or must lock rows, goes through a transaction.
#[async_trait]
pub trait LogStore: Clone + Send + Sync + 'static {
    type Tx: LogTransaction;

    async fn begin(&self, shard: &Shard, isolation: IsolationLevel) -> Result<Self::Tx, StoreError>;

    /// Look an operation up by id (used to verify ambiguous commits)
    async fn find_operation(&self, shard: &Shard, id: &str) -> Result<Option<OperationEntry>, StoreError>;

    async fn get_operation(&self, shard: &Shard, index: u64) -> Result<Option<OperationEntry>, StoreError>;

    /// First operation logged at or after `since`, by index
    async fn first_operation_since(
        &self,
        shard: &Shard,
        since: DateTime<Utc>,
    ) -> Result<Option<OperationEntry>, StoreError>;

    /// Up to `limit` operations with `index >= from`, ordered by index
    async fn read_operations(
        &self,
        shard: &Shard,
        from: u64,
        limit: usize,
    ) -> Result<Vec<OperationEntry>, StoreError>;

    async fn get_event(&self, shard: &Shard, kind: LogKind, uuid: &str) -> Result<Option<EventEntry>, StoreError>;

    async fn stats(&self, shard: &Shard, kind: LogKind, now: DateTime<Utc>) -> Result<LogStats, StoreError>;

    /// Whether `error` is worth retrying. Stores may widen the built-in
    /// classification with driver-specific faults.
    fn is_transient(&self, error: &StoreError) -> bool {
        error.is_transient()
    }
}

/// One database transaction bound to a single shard.
///
/// Writes become visible to others only on [`commit`]. Dropping a
/// transaction without committing rolls it back and releases its locks.
///
/// [`commit`]: LogTransaction::commit
#[async_trait]
pub trait LogTransaction: Send + 'static {
    fn shard(&self) -> &Shard;

    fn isolation(&self) -> IsolationLevel;

    /// Insert an operation row; returns the store-generated index
    async fn insert_operation(&mut self, entry: OperationEntry) -> Result<u64, StoreError>;

    /// Insert a new event row; fails with `DuplicateKey` if the uuid exists
    async fn insert_event(&mut self, entry: EventEntry) -> Result<(), StoreError>;

    /// Lock an event row for update, waiting on no one: a row held by another
    /// transaction fails with `LockTimeout`.
    async fn lock_event(&mut self, kind: LogKind, uuid: &str) -> Result<Option<EventEntry>, StoreError>;

    /// Replace a row locked by this transaction. `entry.version` is the
    /// version that was read; the stored version is bumped.
    async fn update_event(&mut self, entry: EventEntry) -> Result<EventEntry, StoreError>;

    /// Claim up to `limit` due `New` rows, skipping rows locked elsewhere and
    /// uuids in `exclude`; ordered by `delay_until`
    async fn claim_due_events(
        &mut self,
        kind: LogKind,
        now: DateTime<Utc>,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<EventEntry>, StoreError>;

    /// Move a locked row out of `New`, checking the version that was read
    async fn set_event_state(
        &mut self,
        kind: LogKind,
        uuid: &str,
        expected_version: u64,
        state: LogEntryState,
    ) -> Result<EventEntry, StoreError>;

    /// Delete up to `limit` operations logged before `before`, skipping locked rows
    async fn delete_operations_before(&mut self, before: DateTime<Utc>, limit: usize) -> Result<usize, StoreError>;

    /// Delete up to `limit` processed or discarded rows due before `before`,
    /// skipping locked rows
    async fn delete_events_before(
        &mut self,
        kind: LogKind,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
