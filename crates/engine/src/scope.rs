// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation scope: one business transaction and its log rows
//!
//! A scope binds to a shard on first use, accumulates the operation's
//! command and events, and at commit writes one row per event plus one row
//! for the operation in the same transaction. If the commit call itself
//! fails, the operation is looked up by id before the failure is reported.

use crate::completion::CommitListener;
use crate::error::{ScopeError, ScopeOutcome};
use crate::fault::{FaultInjector, FaultPoint, NoFaults};
use oplog_core::{
    Clock, EventEntry, HostId, IdGen, KeyConflictStrategy, LogEntryState, Operation, OperationEntry,
    OperationEvent, ScopeSettings, Shard,
};
use oplog_storage::{LogStore, LogTransaction, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Creates scopes sharing one store, clock, id generator and listener
pub struct ScopeFactory<S, C, I> {
    store: S,
    clock: C,
    ids: I,
    host_id: HostId,
    settings: ScopeSettings,
    faults: Arc<dyn FaultInjector>,
    listener: Option<Arc<dyn CommitListener>>,
}

impl<S: Clone, C: Clone, I: Clone> Clone for ScopeFactory<S, C, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
            host_id: self.host_id.clone(),
            settings: self.settings.clone(),
            faults: Arc::clone(&self.faults),
            listener: self.listener.clone(),
        }
    }
}

impl<S: LogStore, C: Clock, I: IdGen> ScopeFactory<S, C, I> {
    pub fn new(store: S, clock: C, ids: I, host_id: HostId) -> Self {
        Self {
            store,
            clock,
            ids,
            host_id,
            settings: ScopeSettings::default(),
            faults: Arc::new(NoFaults),
            listener: None,
        }
    }

    pub fn with_settings(mut self, settings: ScopeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    /// Start a new operation
    pub fn begin(&self) -> OperationScope<S, C> {
        let operation = Operation::new(self.ids.next_id(), self.host_id.clone(), self.clock.now());
        OperationScope {
            store: self.store.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
            faults: Arc::clone(&self.faults),
            listener: self.listener.clone(),
            operation,
            shard: None,
            tx: None,
            outcome: None,
        }
    }
}

/// Unit of work around one logical business operation.
///
/// Owned by the code running the operation; every state change takes
/// `&mut self`, so only one transaction is ever active on a scope.
pub struct OperationScope<S: LogStore, C> {
    store: S,
    clock: C,
    settings: ScopeSettings,
    faults: Arc<dyn FaultInjector>,
    listener: Option<Arc<dyn CommitListener>>,
    operation: Operation,
    shard: Option<Shard>,
    tx: Option<S::Tx>,
    outcome: Option<ScopeOutcome>,
}

impl<S: LogStore, C: Clock> OperationScope<S, C> {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn shard(&self) -> Option<&Shard> {
        self.shard.as_ref()
    }

    /// `None` while pending
    pub fn outcome(&self) -> Option<ScopeOutcome> {
        self.outcome
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == Some(ScopeOutcome::Committed)
    }

    /// Whether anything bound this scope to a store transaction yet
    pub fn is_used(&self) -> bool {
        self.shard.is_some()
    }

    pub fn set_command(&mut self, command: Value) {
        self.operation.command = Some(command);
    }

    pub fn set_item(&mut self, key: impl Into<String>, value: Value) {
        self.operation.items.insert(key.into(), value);
    }

    pub fn add_nested_operation(&mut self, command: Value) {
        self.operation.nested_operations.push(command);
    }

    pub fn add_event(&mut self, event: OperationEvent) {
        self.operation.events.push(event);
    }

    /// The scope's transaction, opened on `shard` by the first call.
    ///
    /// Later calls must name the same shard.
    pub async fn transaction(&mut self, shard: &Shard) -> Result<&mut S::Tx, ScopeError> {
        if let Some(outcome) = self.outcome {
            return Err(ScopeError::AlreadyClosed(outcome));
        }
        match self.shard.clone() {
            Some(bound) if &bound != shard => {
                return Err(ScopeError::WrongShard {
                    bound,
                    requested: shard.clone(),
                })
            }
            Some(_) => {}
            None => {
                let tx = self.store.begin(shard, self.settings.isolation_level).await?;
                tracing::trace!(%shard, operation = %self.operation.id, "scope bound");
                self.shard = Some(shard.clone());
                self.tx = Some(tx);
            }
        }
        match self.tx.as_mut() {
            Some(tx) => Ok(tx),
            None => Err(ScopeError::AlreadyClosed(ScopeOutcome::RolledBack)),
        }
    }

    /// Commit the transaction with the operation's log rows.
    ///
    /// Committing an already committed scope is a no-op; committing a rolled
    /// back one fails. A scope that never opened a transaction commits
    /// without writing anything.
    pub async fn commit(&mut self) -> Result<(), ScopeError> {
        match self.outcome {
            Some(ScopeOutcome::Committed) => return Ok(()),
            Some(outcome) => return Err(ScopeError::AlreadyClosed(outcome)),
            None => {}
        }
        let (Some(shard), Some(tx)) = (self.shard.clone(), self.tx.take()) else {
            self.outcome = Some(ScopeOutcome::Committed);
            return Ok(());
        };

        let span = tracing::info_span!("scope.commit", %shard, operation = %self.operation.id);
        self.commit_in(shard, tx).instrument(span).await
    }

    async fn commit_in(&mut self, shard: Shard, mut tx: S::Tx) -> Result<(), ScopeError> {
        if self.operation.command.is_none() {
            self.abort(tx).await;
            return Err(ScopeError::NoCommand(self.operation.id.clone()));
        }

        let now = self.clock.now();
        self.operation.commit_time = Some(now);
        let index = match self.write_rows(&mut tx, now).await {
            Ok(index) => index,
            Err(e) => {
                self.abort(tx).await;
                return Err(e);
            }
        };
        if let Err(fault) = self.faults.check(FaultPoint::ScopeCommit, &shard) {
            self.abort(tx).await;
            return Err(fault.into());
        }

        let index = match tx.commit().await {
            Ok(()) => index,
            Err(error) => match self.verify(&shard, &error).await {
                Some(found) => found,
                None => {
                    self.outcome = Some(ScopeOutcome::RolledBack);
                    return Err(error.into());
                }
            },
        };

        self.operation.index = Some(index);
        self.outcome = Some(ScopeOutcome::Committed);
        tracing::debug!(index, events = self.operation.events.len(), "committed");
        if let Some(listener) = &self.listener {
            listener.on_committed(&shard, &self.operation);
        }
        Ok(())
    }

    async fn write_rows(&self, tx: &mut S::Tx, now: chrono::DateTime<chrono::Utc>) -> Result<u64, ScopeError> {
        for event in self.operation.prepared_events() {
            write_event(tx, &event, now).await?;
        }
        let entry = OperationEntry::from_operation(&self.operation, now)?;
        Ok(tx.insert_operation(entry).await?)
    }

    /// Resolve an ambiguous commit by looking the operation up on a fresh read
    async fn verify(&self, shard: &Shard, error: &StoreError) -> Option<u64> {
        match self.store.find_operation(shard, &self.operation.id).await {
            Ok(Some(entry)) => {
                tracing::warn!(error = %error, index = entry.index, "commit failed but operation is logged");
                Some(entry.index)
            }
            Ok(None) => {
                tracing::debug!(error = %error, "commit failed, operation not logged");
                None
            }
            Err(lookup) => {
                tracing::error!(error = %error, lookup_error = %lookup, "commit failed, verification failed");
                None
            }
        }
    }

    /// Re-run the ambiguity check: true if the operation's log row exists.
    ///
    /// Never writes; a confirmed scope takes the logged index.
    pub async fn confirm_commit(&mut self) -> Result<bool, ScopeError> {
        let Some(shard) = self.shard.clone() else {
            return Ok(false);
        };
        match self.store.find_operation(&shard, &self.operation.id).await? {
            Some(entry) => {
                self.operation.index = Some(entry.index);
                self.outcome = Some(ScopeOutcome::Committed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Abort the transaction. Repeated calls are no-ops; rolling back a
    /// committed scope fails.
    pub async fn rollback(&mut self) -> Result<(), ScopeError> {
        match self.outcome {
            Some(ScopeOutcome::RolledBack) => return Ok(()),
            Some(outcome) => return Err(ScopeError::AlreadyClosed(outcome)),
            None => {}
        }
        self.outcome = Some(ScopeOutcome::RolledBack);
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    /// Dispose of the scope, rolling back unless committed
    pub async fn close(mut self) {
        if self.outcome.is_none() {
            if let Err(e) = self.rollback().await {
                tracing::warn!(operation = %self.operation.id, error = %e, "rollback on close failed");
            }
        }
    }

    async fn abort(&mut self, tx: S::Tx) {
        self.outcome = Some(ScopeOutcome::RolledBack);
        if let Err(e) = tx.rollback().await {
            tracing::warn!(operation = %self.operation.id, error = %e, "rollback failed");
        }
    }

    /// Retriable according to the store's classifier; never retried here
    pub fn is_transient_failure(&self, error: &ScopeError) -> bool {
        match error {
            ScopeError::Store(e) => self.store.is_transient(e),
            ScopeError::Injected(fault) => fault.transient,
            _ => false,
        }
    }
}

impl<S: LogStore, C> Drop for OperationScope<S, C> {
    fn drop(&mut self) {
        if self.tx.is_some() && self.outcome.is_none() {
            tracing::debug!(operation = %self.operation.id, "scope dropped while pending, rolling back");
        }
    }
}

async fn write_event<T: LogTransaction>(
    tx: &mut T,
    event: &OperationEvent,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), ScopeError> {
    let entry = EventEntry::from_event(event, now);
    match event.conflict_strategy {
        KeyConflictStrategy::Fail => tx.insert_event(entry).await?,
        KeyConflictStrategy::Ignore => {
            if tx.lock_event(event.kind, &event.uuid).await?.is_none() {
                tx.insert_event(entry).await?;
            }
        }
        KeyConflictStrategy::Update => match tx.lock_event(event.kind, &event.uuid).await? {
            None => tx.insert_event(entry).await?,
            Some(existing) if existing.state != LogEntryState::New => {
                return Err(ScopeError::EntryNotNew {
                    kind: event.kind,
                    uuid: event.uuid.clone(),
                })
            }
            Some(existing) => {
                let replacement = EventEntry {
                    version: existing.version,
                    ..entry
                };
                tx.update_event(replacement).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
