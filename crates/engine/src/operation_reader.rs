// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Co-processed reader for the operations log
//!
//! Every host tails every shard's operations in index order. Indices are
//! allocated when a row is inserted, so a slow or rolled back writer leaves
//! a hole behind rows that are already visible. The reader never waits for
//! a hole: it hands the missing index to a reprocessing task and moves on.

use crate::batch::BatchOutcome;
use crate::error::LogError;
use crate::handler::OperationHandler;
use crate::shard_state::{ShardMap, ShardState};
use crate::supervise::run_supervised;
use oplog_adapters::LogWatcher;
use oplog_core::{Clock, LogKind, OperationEntry, OperationReaderSettings, Shard};
use oplog_storage::LogStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub struct OperationLogReader<S, W, H, C> {
    store: S,
    watcher: W,
    handler: Arc<H>,
    clock: C,
    settings: Arc<OperationReaderSettings>,
    shards: ShardMap,
}

impl<S: Clone, W: Clone, H, C: Clone> Clone for OperationLogReader<S, W, H, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            watcher: self.watcher.clone(),
            handler: Arc::clone(&self.handler),
            clock: self.clock.clone(),
            settings: Arc::clone(&self.settings),
            shards: self.shards.clone(),
        }
    }
}

impl<S, W, H, C> OperationLogReader<S, W, H, C>
where
    S: LogStore,
    W: LogWatcher,
    H: OperationHandler,
    C: Clock,
{
    pub fn new(store: S, watcher: W, handler: H, clock: C, settings: OperationReaderSettings) -> Self {
        Self {
            store,
            watcher,
            handler: Arc::new(handler),
            clock,
            settings: Arc::new(settings),
            shards: ShardMap::new(),
        }
    }

    pub fn settings(&self) -> &OperationReaderSettings {
        &self.settings
    }

    pub fn shard_state(&self, shard: &Shard) -> Arc<ShardState> {
        self.shards.get(shard)
    }

    /// Read and dispatch the next batch of `shard`
    pub async fn process_batch(&self, shard: &Shard) -> Result<BatchOutcome, LogError> {
        let span = tracing::debug_span!("operations.batch", %shard);
        self.process_batch_in(shard).instrument(span).await
    }

    async fn process_batch_in(&self, shard: &Shard) -> Result<BatchOutcome, LogError> {
        let state = self.shards.get(shard);
        let next = match state.next_index() {
            Some(index) => index,
            None => match self.start_index(&state).await? {
                Some(index) => {
                    tracing::debug!(index, "cursor initialized");
                    state.set_next_index(index);
                    index
                }
                None => return Ok(BatchOutcome::default()),
            },
        };

        let batch_size = self.settings.batch_size;
        let rows = self.store.read_operations(shard, next, batch_size).await?;
        let Some(last) = rows.last().map(|row| row.index) else {
            return Ok(BatchOutcome::default());
        };
        let mut outcome = BatchOutcome {
            read: rows.len(),
            full: rows.len() >= batch_size,
            ..BatchOutcome::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency_level.max(1)));
        let mut dispatches = JoinSet::new();
        let mut indices = HashMap::new();
        let mut expected = next;
        for row in rows {
            for missing in expected..row.index {
                tracing::debug!(index = missing, "gap detected");
                if self.spawn_reprocess(&state, missing) {
                    outcome.reprocessing += 1;
                }
            }
            expected = row.index + 1;

            // Permits are taken in index order, so dispatches start in index order
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let reader = self.clone();
            let shard = shard.clone();
            let index = row.index;
            let handle = dispatches.spawn(async move {
                let _permit = permit;
                reader.dispatch(&shard, row).await
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = dispatches.join_next_with_id().await {
            let (index, error) = match joined {
                Ok((_, Ok(()))) => {
                    outcome.processed += 1;
                    continue;
                }
                Ok((id, Err(e))) => (indices.get(&id).copied(), e.to_string()),
                Err(e) => (indices.get(&e.id()).copied(), e.to_string()),
            };
            let Some(index) = index else {
                tracing::error!(error = %error, "operation dispatch task lost its index");
                continue;
            };
            tracing::warn!(index, error = %error, "operation dispatch failed, reprocessing");
            if self.spawn_reprocess(&state, index) {
                outcome.reprocessing += 1;
            }
        }
        state.set_next_index(last + 1);

        if outcome.full {
            tracing::warn!(count = outcome.read, next = last + 1, "full batch, log is behind");
        } else {
            tracing::debug!(count = outcome.read, next = last + 1, "batch processed");
        }
        Ok(outcome)
    }

    /// First index to read on a fresh cursor; never replays older history
    async fn start_index(&self, state: &ShardState) -> Result<Option<u64>, LogError> {
        let first_lookup = state.first_lookup(self.clock.now());
        let since = chrono::Duration::from_std(self.settings.start_offset)
            .ok()
            .and_then(|offset| first_lookup.checked_sub_signed(offset))
            .unwrap_or(first_lookup);
        let entry = self.store.first_operation_since(state.shard(), since).await?;
        Ok(entry.map(|e| e.index))
    }

    async fn dispatch(&self, shard: &Shard, row: OperationEntry) -> Result<(), LogError> {
        let operation = row.to_operation()?;
        self.handler.handle(shard, &operation).await?;
        tracing::trace!(index = row.index, operation = %operation.id, "dispatched");
        Ok(())
    }

    fn spawn_reprocess(&self, state: &ShardState, index: u64) -> bool {
        let reader = self.clone();
        let shard = state.shard().clone();
        let span = tracing::info_span!("operations.reprocess", %shard, index);
        state
            .reprocess()
            .try_spawn(index.to_string(), async move { reader.reprocess(&shard, index).await }.instrument(span))
    }

    async fn reprocess(&self, shard: &Shard, index: u64) {
        tokio::time::sleep(self.settings.reprocess_delay.next()).await;
        let attempts = self.settings.reprocess_attempts.max(1);
        for attempt in 1..=attempts {
            match self.reprocess_once(shard, index).await {
                Ok(()) => {
                    tracing::info!(attempt, "operation reprocessed");
                    return;
                }
                Err(e) if !e.is_transient_with(|e| self.store.is_transient(e)) => {
                    tracing::error!(error = %e, "operation reprocessing failed, skipped");
                    return;
                }
                Err(e) if attempt < attempts => {
                    let delay = self.settings.reprocess_delays.delay(attempt);
                    tracing::debug!(attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "reprocessing retry");
                    tokio::time::sleep(delay).await;
                }
                Err(LogError::EntryNotFound { .. }) => {
                    tracing::error!(attempts, "operation never appeared, skipped");
                }
                Err(e) => {
                    tracing::error!(attempts, error = %e, "operation reprocessing failed, skipped");
                }
            }
        }
    }

    async fn reprocess_once(&self, shard: &Shard, index: u64) -> Result<(), LogError> {
        match self.store.get_operation(shard, index).await? {
            Some(row) => self.dispatch(shard, row).await,
            None => Err(LogError::EntryNotFound {
                kind: LogKind::Operations,
                key: index.to_string(),
            }),
        }
    }

    /// Tail `shard` until `cancel` fires
    pub async fn run(&self, shard: Shard, cancel: CancellationToken) {
        let delays = self.settings.retry_delays.clone();
        let shard = &shard;
        let cancel_ref = &cancel;
        run_supervised("operation reader", shard, delays, cancel_ref, || self.cycle(shard, cancel_ref)).await;
    }

    async fn cycle(&self, shard: &Shard, cancel: &CancellationToken) -> Result<(), LogError> {
        loop {
            // Subscribe before reading so a commit racing the read still wakes us
            let changed = self.watcher.when_changed(shard);
            let outcome = self.process_batch(shard).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            if outcome.full {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = changed.changed() => {}
                _ = tokio::time::sleep(self.settings.check_period.next()) => {}
            }
        }
    }

    /// Wait for every shard's reprocessing tasks; returns how many were abandoned
    pub async fn drain(&self, timeout: Duration) -> usize {
        self.shards.drain(timeout).await
    }
}

#[cfg(test)]
#[path = "operation_reader_tests.rs"]
mod tests;
