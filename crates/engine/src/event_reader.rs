// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uno-processed reader for the events and timers logs
//!
//! Due `New` rows are claimed with skip-locked row locks, so readers on any
//! number of hosts never claim the same row twice. Handlers run while the
//! claiming transaction is open and successful rows are marked `Processed`
//! in that same transaction.

use crate::batch::BatchOutcome;
use crate::error::{HandlerError, LogError};
use crate::fault::{FaultInjector, FaultPoint, NoFaults};
use crate::handler::EventHandler;
use crate::shard_state::{ShardMap, ShardState};
use crate::supervise::{run_supervised, sleep_or_cancel};
use oplog_adapters::LogWatcher;
use oplog_core::{Clock, DiscardPolicy, EventEntry, EventReaderSettings, IsolationLevel, LogEntryState, LogKind, Shard};
use oplog_storage::{LogStore, LogTransaction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub struct EventLogReader<S, W, H, C> {
    kind: LogKind,
    store: S,
    watcher: W,
    handler: Arc<H>,
    clock: C,
    settings: Arc<EventReaderSettings>,
    isolation: IsolationLevel,
    faults: Arc<dyn FaultInjector>,
    shards: ShardMap,
}

impl<S: Clone, W: Clone, H, C: Clone> Clone for EventLogReader<S, W, H, C> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            store: self.store.clone(),
            watcher: self.watcher.clone(),
            handler: Arc::clone(&self.handler),
            clock: self.clock.clone(),
            settings: Arc::clone(&self.settings),
            isolation: self.isolation,
            faults: Arc::clone(&self.faults),
            shards: self.shards.clone(),
        }
    }
}

/// How a claimed row's handler ended
struct Handled {
    entry: EventEntry,
    result: Result<(), HandlerError>,
}

impl<S, W, H, C> EventLogReader<S, W, H, C>
where
    S: LogStore,
    W: LogWatcher,
    H: EventHandler,
    C: Clock,
{
    /// Reader for the events log
    pub fn events(store: S, watcher: W, handler: H, clock: C, settings: EventReaderSettings) -> Self {
        Self::new(LogKind::Events, store, watcher, handler, clock, settings)
    }

    /// Reader for the timers log
    pub fn timers(store: S, watcher: W, handler: H, clock: C, settings: EventReaderSettings) -> Self {
        Self::new(LogKind::Timers, store, watcher, handler, clock, settings)
    }

    fn new(kind: LogKind, store: S, watcher: W, handler: H, clock: C, settings: EventReaderSettings) -> Self {
        Self {
            kind,
            store,
            watcher,
            handler: Arc::new(handler),
            clock,
            settings: Arc::new(settings),
            isolation: IsolationLevel::default(),
            faults: Arc::new(NoFaults),
            shards: ShardMap::new(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn settings(&self) -> &EventReaderSettings {
        &self.settings
    }

    pub fn shard_state(&self, shard: &Shard) -> Arc<ShardState> {
        self.shards.get(shard)
    }

    fn is_transient(&self, error: &LogError) -> bool {
        error.is_transient_with(|e| self.store.is_transient(e))
    }

    /// Claim and handle the next batch of due rows in `shard`
    pub async fn process_batch(&self, shard: &Shard) -> Result<BatchOutcome, LogError> {
        let span = tracing::debug_span!("events.batch", kind = %self.kind, %shard);
        self.process_batch_in(shard).instrument(span).await
    }

    async fn process_batch_in(&self, shard: &Shard) -> Result<BatchOutcome, LogError> {
        let state = self.shards.get(shard);
        let in_flight = state.reprocess().keys();
        let limit = self.settings.batch_size.saturating_sub(in_flight.len());
        if limit == 0 {
            tracing::debug!(in_flight = in_flight.len(), "reprocessing backlog, not claiming");
            return Ok(BatchOutcome::busy());
        }

        let mut tx = self.store.begin(shard, self.isolation).await?;
        let claimed = tx
            .claim_due_events(self.kind, self.clock.now(), limit, &in_flight)
            .await?;
        if claimed.is_empty() {
            tx.rollback().await?;
            return Ok(BatchOutcome::default());
        }
        let mut outcome = BatchOutcome {
            read: claimed.len(),
            full: claimed.len() >= limit,
            ..BatchOutcome::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency_level.max(1)));
        let mut handlers = JoinSet::new();
        let mut uuids = HashMap::new();
        for entry in claimed {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let handler = Arc::clone(&self.handler);
            let shard = shard.clone();
            let uuid = entry.uuid.clone();
            let handle = handlers.spawn(async move {
                let _permit = permit;
                let result = handler.handle(&shard, &entry).await;
                Handled { entry, result }
            });
            uuids.insert(handle.id(), uuid);
        }

        let mut failed = Vec::new();
        while let Some(joined) = handlers.join_next_with_id().await {
            match joined.map(|(_, handled)| handled) {
                Ok(Handled { entry, result: Ok(()) }) => {
                    tx.set_event_state(self.kind, &entry.uuid, entry.version, LogEntryState::Processed)
                        .await?;
                    outcome.processed += 1;
                }
                Ok(Handled { entry, result: Err(e) }) => {
                    tracing::warn!(uuid = %entry.uuid, error = %e, "handler failed, reprocessing");
                    failed.push((entry.uuid, e.is_transient()));
                }
                Err(e) => match uuids.remove(&e.id()) {
                    Some(uuid) => {
                        tracing::warn!(%uuid, error = %e, "handler task failed, reprocessing");
                        failed.push((uuid, true));
                    }
                    None => tracing::error!(error = %e, "event handler task failed"),
                },
            }
        }

        self.faults.check(FaultPoint::ClaimCommit, shard)?;
        tx.commit().await?;

        for (uuid, transient) in failed {
            if self.spawn_reprocess(&state, uuid, !transient) {
                outcome.reprocessing += 1;
            }
        }
        if outcome.full {
            tracing::warn!(count = outcome.read, processed = outcome.processed, "full batch, log is behind");
        } else {
            tracing::debug!(count = outcome.read, processed = outcome.processed, "batch processed");
        }
        Ok(outcome)
    }

    fn spawn_reprocess(&self, state: &ShardState, uuid: String, discard_only: bool) -> bool {
        let reader = self.clone();
        let shard = state.shard().clone();
        let span = tracing::info_span!("events.reprocess", kind = %self.kind, %shard, %uuid);
        let key = uuid.clone();
        state.reprocess().try_spawn(
            key,
            async move { reader.reprocess(&shard, &uuid, discard_only).await }.instrument(span),
        )
    }

    async fn reprocess(&self, shard: &Shard, uuid: &str, discard_only: bool) {
        tokio::time::sleep(self.settings.reprocess_delay.next()).await;
        if !discard_only && self.process_phase(shard, uuid).await {
            return;
        }
        self.discard_phase(shard, uuid).await;
    }

    /// Retry the handler; true once the row is no longer `New`
    async fn process_phase(&self, shard: &Shard, uuid: &str) -> bool {
        let attempts = self.settings.reprocess_attempts.max(1);
        for attempt in 1..=attempts {
            match self.process_once(shard, uuid).await {
                Ok(true) => {
                    tracing::info!(attempt, "entry reprocessed");
                    return true;
                }
                Ok(false) => {
                    tracing::debug!("entry already processed elsewhere");
                    return true;
                }
                Err(e) if !self.is_transient(&e) => {
                    tracing::error!(error = %e, "entry reprocessing failed");
                    return false;
                }
                Err(e) if attempt < attempts => {
                    let delay = self.settings.reprocess_delays.delay(attempt);
                    tracing::debug!(attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "reprocessing retry");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => tracing::error!(attempts, error = %e, "entry reprocessing exhausted"),
            }
        }
        false
    }

    fn not_found(&self, uuid: &str) -> LogError {
        LogError::EntryNotFound {
            kind: self.kind,
            key: uuid.to_string(),
        }
    }

    /// Process a single row in its own transaction; false if it was already final
    async fn process_once(&self, shard: &Shard, uuid: &str) -> Result<bool, LogError> {
        let mut tx = self.store.begin(shard, self.isolation).await?;
        let Some(entry) = tx.lock_event(self.kind, uuid).await? else {
            tx.rollback().await?;
            return Err(self.not_found(uuid));
        };
        if entry.state.is_final() {
            tx.rollback().await?;
            return Ok(false);
        }
        self.handler.handle(shard, &entry).await?;
        tx.set_event_state(self.kind, uuid, entry.version, LogEntryState::Processed)
            .await?;
        self.faults.check(FaultPoint::ClaimCommit, shard)?;
        tx.commit().await?;
        Ok(true)
    }

    async fn discard_phase(&self, shard: &Shard, uuid: &str) {
        if self.settings.discard_policy == DiscardPolicy::Keep {
            tracing::warn!("entry kept for the next batch");
            return;
        }
        let attempts = self.settings.reprocess_attempts.max(1);
        for attempt in 1..=attempts {
            match self.discard_once(shard, uuid).await {
                Ok(true) => {
                    tracing::error!("entry discarded");
                    return;
                }
                Ok(false) => return,
                Err(e) if !self.is_transient(&e) => {
                    tracing::error!(error = %e, "discard failed");
                    return;
                }
                Err(e) if attempt < attempts => {
                    tokio::time::sleep(self.settings.reprocess_delays.delay(attempt)).await;
                    tracing::debug!(attempt, error = %e, "discard retry");
                }
                Err(e) => tracing::error!(attempts, error = %e, "discard exhausted"),
            }
        }
    }

    async fn discard_once(&self, shard: &Shard, uuid: &str) -> Result<bool, LogError> {
        if !self.kind.has_explicit_state() {
            return Err(LogError::CannotDiscard(self.kind));
        }
        let mut tx = self.store.begin(shard, self.isolation).await?;
        let Some(entry) = tx.lock_event(self.kind, uuid).await? else {
            tx.rollback().await?;
            return Err(self.not_found(uuid));
        };
        if entry.state.is_final() {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.set_event_state(self.kind, uuid, entry.version, LogEntryState::Discarded)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Claim from `shard` until `cancel` fires
    pub async fn run(&self, shard: Shard, cancel: CancellationToken) {
        let delays = self.settings.retry_delays.clone();
        let name = match self.kind {
            LogKind::Timers => "timer reader",
            _ => "event reader",
        };
        let shard = &shard;
        let cancel_ref = &cancel;
        run_supervised(name, shard, delays, cancel_ref, || self.cycle(shard, cancel_ref)).await;
    }

    async fn cycle(&self, shard: &Shard, cancel: &CancellationToken) -> Result<(), LogError> {
        loop {
            let changed = self.watcher.when_changed(shard);
            let outcome = self.process_batch(shard).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
            if outcome.busy {
                if !sleep_or_cancel(self.settings.busy_delay, cancel).await {
                    return Ok(());
                }
                continue;
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
#[path = "event_reader_tests.rs"]
mod tests;
