// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention enforcement and statistics for one log
//!
//! Trim batches delete with skip-locked semantics, so rows claimed by an
//! in-flight reader are left for a later pass.

use crate::error::LogError;
use crate::supervise::{run_supervised, sleep_or_cancel};
use oplog_core::{Clock, IsolationLevel, LogKind, Shard, TrimmerSettings};
use oplog_storage::{LogStats, LogStore, LogTransaction};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct LogTrimmer<S, C> {
    kind: LogKind,
    store: S,
    clock: C,
    settings: Arc<TrimmerSettings>,
}

impl<S: Clone, C: Clone> Clone for LogTrimmer<S, C> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            store: self.store.clone(),
            clock: self.clock.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: LogStore, C: Clock> LogTrimmer<S, C> {
    pub fn new(kind: LogKind, store: S, clock: C, settings: TrimmerSettings) -> Self {
        Self {
            kind,
            store,
            clock,
            settings: Arc::new(settings),
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Delete one batch of expired rows; returns how many were deleted
    pub async fn trim_batch(&self, shard: &Shard) -> Result<usize, LogError> {
        let before = self.clock.now_minus(self.settings.max_entry_age_for(self.kind));
        let limit = self.settings.batch_size;
        let mut tx = self.store.begin(shard, IsolationLevel::ReadCommitted).await?;
        let deleted = if self.kind.is_broadcast() {
            tx.delete_operations_before(before, limit).await?
        } else {
            tx.delete_events_before(self.kind, before, limit).await?
        };
        tx.commit().await?;
        tracing::debug!(kind = %self.kind, %shard, count = deleted, "trim batch");
        Ok(deleted)
    }

    /// Trim until a batch comes back short
    pub async fn trim(&self, shard: &Shard) -> Result<usize, LogError> {
        let mut total = 0;
        loop {
            let deleted = self.trim_batch(shard).await?;
            total += deleted;
            if deleted < self.settings.batch_size {
                break;
            }
        }
        if total > 0 {
            tracing::info!(kind = %self.kind, %shard, count = total, "log trimmed");
        }
        Ok(total)
    }

    /// Collect and log statistics for `shard`
    pub async fn report_statistics(&self, shard: &Shard) -> Result<LogStats, LogError> {
        let now = self.clock.now();
        let stats = self.store.stats(shard, self.kind, now).await?;
        if self.kind.is_broadcast() {
            tracing::info!(
                kind = %self.kind,
                %shard,
                total = stats.total,
                entries_per_second = stats.entries_per_second(now),
                oldest = ?stats.oldest_logged_at,
                "log statistics"
            );
        } else {
            tracing::info!(
                kind = %self.kind,
                %shard,
                total = stats.total,
                queued = stats.queued,
                pending = stats.pending,
                processed = stats.processed,
                discarded = stats.discarded,
                oldest = ?stats.oldest_logged_at,
                "log statistics"
            );
        }
        Ok(stats)
    }

    /// Trim `shard` every check period until `cancel` fires
    pub async fn run(&self, shard: Shard, cancel: CancellationToken) {
        if !sleep_or_cancel(self.settings.initial_delay(), &cancel).await {
            return;
        }
        let delays = self.settings.retry_delays.clone();
        let shard = &shard;
        let cancel_ref = &cancel;
        run_supervised("trimmer", shard, delays, cancel_ref, || async move {
            self.trim(shard).await?;
            sleep_or_cancel(self.settings.check_period.next(), cancel_ref).await;
            Ok::<(), LogError>(())
        })
        .await;
    }

    /// Report statistics every statistics period; failures are only logged
    pub async fn run_statistics(&self, shard: Shard, cancel: CancellationToken) {
        while sleep_or_cancel(self.settings.statistics_period.next(), &cancel).await {
            if let Err(e) = self.report_statistics(&shard).await {
                tracing::warn!(kind = %self.kind, %shard, error = %e, "statistics failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "trimmer_tests.rs"]
mod tests;
