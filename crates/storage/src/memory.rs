// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory log store
//!
//! Mirrors the behavior the log layer relies on from a relational database:
//! - sequence values are handed out at insert time, so rolled back or
//!   slow transactions leave gaps that later fill or never fill
//! - writes are buffered per transaction and applied atomically on commit
//! - row locks are held until commit/rollback; claims skip locked rows

use crate::error::StoreError;
use crate::store::{LogStore, LogTransaction};
use crate::types::LogStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oplog_core::{EventEntry, IsolationLevel, LogEntryState, LogKind, OperationEntry, Shard};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

type TxId = u64;

#[derive(Default)]
struct ShardData {
    last_index: u64,
    operations: BTreeMap<u64, OperationEntry>,
    events: HashMap<LogKind, BTreeMap<String, EventEntry>>,
    event_locks: HashMap<(LogKind, String), TxId>,
    operation_locks: HashMap<u64, TxId>,
}

impl ShardData {
    fn events(&self, kind: LogKind) -> impl Iterator<Item = &EventEntry> {
        self.events.get(&kind).into_iter().flat_map(|rows| rows.values())
    }

    fn event(&self, kind: LogKind, uuid: &str) -> Option<&EventEntry> {
        self.events.get(&kind).and_then(|rows| rows.get(uuid))
    }

    fn event_locked_by_other(&self, kind: LogKind, uuid: &str, tx: TxId) -> bool {
        self.event_locks
            .get(&(kind, uuid.to_string()))
            .is_some_and(|holder| *holder != tx)
    }

    fn release(&mut self, tx: TxId) {
        self.event_locks.retain(|_, holder| *holder != tx);
        self.operation_locks.retain(|_, holder| *holder != tx);
    }
}

struct CommitFault {
    error: StoreError,
    applied: bool,
}

#[derive(Default)]
struct MemoryState {
    shards: HashMap<Shard, ShardData>,
    last_tx: TxId,
    begin_faults: VecDeque<StoreError>,
    read_faults: VecDeque<StoreError>,
    commit_faults: VecDeque<CommitFault>,
}

impl MemoryState {
    fn shard(&mut self, shard: &Shard) -> &mut ShardData {
        self.shards.entry(shard.clone()).or_default()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared in-memory database; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `begin` fail with `error`
    pub fn fail_next_begin(&self, error: StoreError) {
        lock(&self.state).begin_faults.push_back(error);
    }

    /// Make the next non-transactional read fail with `error`
    pub fn fail_next_read(&self, error: StoreError) {
        lock(&self.state).read_faults.push_back(error);
    }

    /// Make the next commit fail with `error` without applying anything
    pub fn fail_next_commit(&self, error: StoreError) {
        lock(&self.state).commit_faults.push_back(CommitFault {
            error,
            applied: false,
        });
    }

    /// Make the next commit apply its writes and then report `error`, as when
    /// the acknowledgement of a successful commit is lost
    pub fn fail_next_commit_after_apply(&self, error: StoreError) {
        lock(&self.state).commit_faults.push_back(CommitFault {
            error,
            applied: true,
        });
    }

    /// Committed operations of `shard`, by index
    pub fn operations(&self, shard: &Shard) -> Vec<OperationEntry> {
        let state = lock(&self.state);
        state
            .shards
            .get(shard)
            .map(|data| data.operations.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed event or timer rows of `shard`, by uuid
    pub fn events(&self, shard: &Shard, kind: LogKind) -> Vec<EventEntry> {
        let state = lock(&self.state);
        state
            .shards
            .get(shard)
            .map(|data| data.events(kind).cloned().collect())
            .unwrap_or_default()
    }

    /// Highest sequence value handed out for `shard`, committed or not
    pub fn last_index(&self, shard: &Shard) -> u64 {
        let state = lock(&self.state);
        state.shards.get(shard).map(|d| d.last_index).unwrap_or(0)
    }

    /// Number of event/timer rows currently locked in `shard`
    pub fn locked_events(&self, shard: &Shard, kind: LogKind) -> usize {
        let state = lock(&self.state);
        state
            .shards
            .get(shard)
            .map(|d| d.event_locks.keys().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.read_faults.pop_front() {
            return Err(error);
        }
        Ok(state)
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    type Tx = MemoryTransaction;

    async fn begin(&self, shard: &Shard, isolation: IsolationLevel) -> Result<MemoryTransaction, StoreError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.begin_faults.pop_front() {
            return Err(error);
        }
        state.last_tx += 1;
        let id = state.last_tx;
        state.shard(shard);
        Ok(MemoryTransaction {
            id,
            shard: shard.clone(),
            isolation,
            state: Arc::clone(&self.state),
            writes: Vec::new(),
            finished: false,
        })
    }

    async fn find_operation(&self, shard: &Shard, id: &str) -> Result<Option<OperationEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .shards
            .get(shard)
            .and_then(|data| data.operations.values().find(|e| e.uuid == id).cloned()))
    }

    async fn get_operation(&self, shard: &Shard, index: u64) -> Result<Option<OperationEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .shards
            .get(shard)
            .and_then(|data| data.operations.get(&index).cloned()))
    }

    async fn first_operation_since(
        &self,
        shard: &Shard,
        since: DateTime<Utc>,
    ) -> Result<Option<OperationEntry>, StoreError> {
        let state = self.read()?;
        Ok(state.shards.get(shard).and_then(|data| {
            data.operations
                .values()
                .find(|e| e.logged_at >= since)
                .cloned()
        }))
    }

    async fn read_operations(
        &self,
        shard: &Shard,
        from: u64,
        limit: usize,
    ) -> Result<Vec<OperationEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .shards
            .get(shard)
            .map(|data| {
                data.operations
                    .range(from..)
                    .take(limit)
                    .map(|(_, e)| e.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_event(&self, shard: &Shard, kind: LogKind, uuid: &str) -> Result<Option<EventEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .shards
            .get(shard)
            .and_then(|data| data.event(kind, uuid).cloned()))
    }

    async fn stats(&self, shard: &Shard, kind: LogKind, now: DateTime<Utc>) -> Result<LogStats, StoreError> {
        let state = self.read()?;
        let mut stats = LogStats::empty(kind);
        let Some(data) = state.shards.get(shard) else {
            return Ok(stats);
        };

        if kind.is_broadcast() {
            for entry in data.operations.values() {
                track(&mut stats, entry.logged_at);
            }
            return Ok(stats);
        }

        for entry in data.events(kind) {
            track(&mut stats, entry.logged_at);
            match entry.state {
                LogEntryState::New if entry.delay_until > now => stats.queued += 1,
                LogEntryState::New => stats.pending += 1,
                LogEntryState::Processed => stats.processed += 1,
                LogEntryState::Discarded => stats.discarded += 1,
            }
        }
        Ok(stats)
    }
}

fn track(stats: &mut LogStats, logged_at: DateTime<Utc>) {
    stats.total += 1;
    stats.oldest_logged_at = Some(stats.oldest_logged_at.map_or(logged_at, |t| t.min(logged_at)));
    stats.newest_logged_at = Some(stats.newest_logged_at.map_or(logged_at, |t| t.max(logged_at)));
}

enum Write {
    InsertOperation(OperationEntry),
    InsertEvent(EventEntry),
    UpdateEvent { expected_version: u64, entry: EventEntry },
    DeleteOperation(u64),
    DeleteEvent(LogKind, String),
}

/// Transaction over a [`MemoryLogStore`] shard
pub struct MemoryTransaction {
    id: TxId,
    shard: Shard,
    isolation: IsolationLevel,
    state: Arc<Mutex<MemoryState>>,
    writes: Vec<Write>,
    finished: bool,
}

impl MemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn with_shard<R>(&self, f: impl FnOnce(&mut ShardData) -> R) -> R {
        let mut state = lock(&self.state);
        f(state.shard(&self.shard))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Internal(format!("transaction {} already finished", self.id)));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        let mut state = lock(&self.state);
        let fault = state.commit_faults.pop_front();
        let data = state.shard(&self.shard);

        let lost_ack = match fault {
            Some(CommitFault {
                error,
                applied: false,
            }) => {
                data.release(self.id);
                return Err(error);
            }
            Some(CommitFault { error, .. }) => Some(error),
            None => None,
        };
        if let Err(error) = validate(data, &writes) {
            data.release(self.id);
            return Err(error);
        }
        let count = writes.len();
        apply(data, writes);
        data.release(self.id);
        tracing::trace!(tx = self.id, shard = %self.shard, writes = count, "committed");

        match lost_ack {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.writes.clear();
        let id = self.id;
        self.with_shard(|data| data.release(id));
    }

    fn locked_row(&self, data: &ShardData, kind: LogKind, uuid: &str) -> Result<EventEntry, StoreError> {
        if data.event_locked_by_other(kind, uuid, self.id) {
            return Err(StoreError::LockTimeout {
                kind,
                key: uuid.to_string(),
            });
        }
        data.event(kind, uuid).cloned().ok_or_else(|| StoreError::NotFound {
            kind,
            key: uuid.to_string(),
        })
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.abort();
    }
}

fn validate(data: &ShardData, writes: &[Write]) -> Result<(), StoreError> {
    for write in writes {
        match write {
            Write::InsertEvent(entry) => {
                if data.event(entry.kind, &entry.uuid).is_some() {
                    return Err(StoreError::DuplicateKey {
                        kind: entry.kind,
                        key: entry.uuid.clone(),
                    });
                }
            }
            Write::UpdateEvent {
                expected_version,
                entry,
            } => match data.event(entry.kind, &entry.uuid) {
                None => {
                    return Err(StoreError::NotFound {
                        kind: entry.kind,
                        key: entry.uuid.clone(),
                    })
                }
                Some(current) if current.version != *expected_version => {
                    return Err(StoreError::ConcurrencyConflict {
                        kind: entry.kind,
                        key: entry.uuid.clone(),
                    })
                }
                Some(_) => {}
            },
            Write::InsertOperation(_) | Write::DeleteOperation(_) | Write::DeleteEvent(..) => {}
        }
    }
    Ok(())
}

fn apply(data: &mut ShardData, writes: Vec<Write>) {
    for write in writes {
        match write {
            Write::InsertOperation(entry) => {
                data.operations.insert(entry.index, entry);
            }
            Write::InsertEvent(entry) | Write::UpdateEvent { entry, .. } => {
                data.events
                    .entry(entry.kind)
                    .or_default()
                    .insert(entry.uuid.clone(), entry);
            }
            Write::DeleteOperation(index) => {
                data.operations.remove(&index);
            }
            Write::DeleteEvent(kind, uuid) => {
                if let Some(rows) = data.events.get_mut(&kind) {
                    rows.remove(&uuid);
                }
            }
        }
    }
}

#[async_trait]
impl LogTransaction for MemoryTransaction {
    fn shard(&self) -> &Shard {
        &self.shard
    }

    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    async fn insert_operation(&mut self, mut entry: OperationEntry) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let index = self.with_shard(|data| {
            data.last_index += 1;
            data.last_index
        });
        entry.index = index;
        self.writes.push(Write::InsertOperation(entry));
        Ok(index)
    }

    async fn insert_event(&mut self, entry: EventEntry) -> Result<(), StoreError> {
        self.ensure_open()?;
        if entry.kind.is_broadcast() {
            return Err(StoreError::Internal("operations are not uuid-keyed".to_string()));
        }
        let exists = self.with_shard(|data| data.event(entry.kind, &entry.uuid).is_some());
        if exists {
            return Err(StoreError::DuplicateKey {
                kind: entry.kind,
                key: entry.uuid,
            });
        }
        self.writes.push(Write::InsertEvent(entry));
        Ok(())
    }

    async fn lock_event(&mut self, kind: LogKind, uuid: &str) -> Result<Option<EventEntry>, StoreError> {
        self.ensure_open()?;
        let id = self.id;
        self.with_shard(|data| {
            if data.event_locked_by_other(kind, uuid, id) {
                return Err(StoreError::LockTimeout {
                    kind,
                    key: uuid.to_string(),
                });
            }
            let Some(row) = data.event(kind, uuid).cloned() else {
                return Ok(None);
            };
            data.event_locks.insert((kind, uuid.to_string()), id);
            Ok(Some(row))
        })
    }

    async fn update_event(&mut self, entry: EventEntry) -> Result<EventEntry, StoreError> {
        self.ensure_open()?;
        let current = {
            let state = lock(&self.state);
            match state.shards.get(&self.shard) {
                Some(data) => self.locked_row(data, entry.kind, &entry.uuid)?,
                None => {
                    return Err(StoreError::NotFound {
                        kind: entry.kind,
                        key: entry.uuid,
                    })
                }
            }
        };
        if current.version != entry.version {
            return Err(StoreError::ConcurrencyConflict {
                kind: entry.kind,
                key: entry.uuid,
            });
        }
        let id = self.id;
        let key = (entry.kind, entry.uuid.clone());
        self.with_shard(|data| data.event_locks.insert(key, id));

        let expected_version = entry.version;
        let mut updated = entry;
        updated.version = expected_version + 1;
        self.writes.push(Write::UpdateEvent {
            expected_version,
            entry: updated.clone(),
        });
        Ok(updated)
    }

    async fn claim_due_events(
        &mut self,
        kind: LogKind,
        now: DateTime<Utc>,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<EventEntry>, StoreError> {
        self.ensure_open()?;
        let id = self.id;
        Ok(self.with_shard(|data| {
            let view: &ShardData = data;
            let mut due: Vec<EventEntry> = view
                .events(kind)
                .filter(|e| e.is_due(now))
                .filter(|e| !exclude.contains(&e.uuid))
                .filter(|e| !view.event_locked_by_other(kind, &e.uuid, id))
                .cloned()
                .collect();
            due.sort_by(|a, b| (a.delay_until, &a.uuid).cmp(&(b.delay_until, &b.uuid)));
            due.truncate(limit);
            for entry in &due {
                data.event_locks.insert((kind, entry.uuid.clone()), id);
            }
            due
        }))
    }

    async fn set_event_state(
        &mut self,
        kind: LogKind,
        uuid: &str,
        expected_version: u64,
        state: LogEntryState,
    ) -> Result<EventEntry, StoreError> {
        self.ensure_open()?;
        let id = self.id;
        let current = {
            let mut guard = lock(&self.state);
            let data = guard.shard(&self.shard);
            let row = self.locked_row(data, kind, uuid)?;
            data.event_locks.insert((kind, uuid.to_string()), id);
            row
        };
        if current.version != expected_version || !current.state.can_transition_to(state) {
            return Err(StoreError::ConcurrencyConflict {
                kind,
                key: uuid.to_string(),
            });
        }
        let mut updated = current;
        updated.state = state;
        updated.version = expected_version + 1;
        self.writes.push(Write::UpdateEvent {
            expected_version,
            entry: updated.clone(),
        });
        Ok(updated)
    }

    async fn delete_operations_before(&mut self, before: DateTime<Utc>, limit: usize) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let id = self.id;
        let doomed = self.with_shard(|data| {
            let view: &ShardData = data;
            let doomed: Vec<u64> = view
                .operations
                .values()
                .filter(|e| e.logged_at < before)
                .filter(|e| !matches!(view.operation_locks.get(&e.index), Some(h) if *h != id))
                .map(|e| e.index)
                .take(limit)
                .collect();
            for index in &doomed {
                data.operation_locks.insert(*index, id);
            }
            doomed
        });
        let count = doomed.len();
        self.writes.extend(doomed.into_iter().map(Write::DeleteOperation));
        Ok(count)
    }

    async fn delete_events_before(
        &mut self,
        kind: LogKind,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let id = self.id;
        let doomed = self.with_shard(|data| {
            let view: &ShardData = data;
            let mut rows: Vec<&EventEntry> = view
                .events(kind)
                .filter(|e| e.state.is_final() && e.delay_until <= before)
                .filter(|e| !view.event_locked_by_other(kind, &e.uuid, id))
                .collect();
            rows.sort_by(|a, b| (a.delay_until, &a.uuid).cmp(&(b.delay_until, &b.uuid)));
            let doomed: Vec<String> = rows.into_iter().take(limit).map(|e| e.uuid.clone()).collect();
            for uuid in &doomed {
                data.event_locks.insert((kind, uuid.clone()), id);
            }
            doomed
        });
        let count = doomed.len();
        self.writes
            .extend(doomed.into_iter().map(|uuid| Write::DeleteEvent(kind, uuid)));
        Ok(count)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finish()
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.abort();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
