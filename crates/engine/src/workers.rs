// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background loops for a set of shards
//!
//! One supervised task per (shard, log, responsibility). All of them share a
//! cancellation token; shutdown cancels it, joins the loops and then the
//! readers' reprocessing tasks.

use crate::event_reader::EventLogReader;
use crate::handler::{EventHandler, OperationHandler};
use crate::operation_reader::OperationLogReader;
use crate::trimmer::LogTrimmer;
use async_trait::async_trait;
use oplog_adapters::LogWatcher;
use oplog_core::{Clock, Shard};
use oplog_storage::LogStore;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Something holding reprocessing tasks that must be joined at shutdown
#[async_trait]
pub trait ReprocessDrain: Send + Sync + 'static {
    /// Returns how many tasks were abandoned
    async fn drain(&self, timeout: Duration) -> usize;
}

#[async_trait]
impl<S, W, H, C> ReprocessDrain for OperationLogReader<S, W, H, C>
where
    S: LogStore,
    W: LogWatcher,
    H: OperationHandler,
    C: Clock,
{
    async fn drain(&self, timeout: Duration) -> usize {
        OperationLogReader::drain(self, timeout).await
    }
}

#[async_trait]
impl<S, W, H, C> ReprocessDrain for EventLogReader<S, W, H, C>
where
    S: LogStore,
    W: LogWatcher,
    H: EventHandler,
    C: Clock,
{
    async fn drain(&self, timeout: Duration) -> usize {
        EventLogReader::drain(self, timeout).await
    }
}

#[derive(Default)]
pub struct ShardWorkers {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    drains: Vec<Box<dyn ReprocessDrain>>,
}

impl ShardWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers stopped by `cancel` or by [`ShardWorkers::shutdown`]
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of loops still running
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn_operation_reader<S, W, H, C>(
        &mut self,
        reader: OperationLogReader<S, W, H, C>,
        shards: impl IntoIterator<Item = Shard>,
    ) where
        S: LogStore,
        W: LogWatcher,
        H: OperationHandler,
        C: Clock,
    {
        for shard in shards {
            let reader = reader.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move { reader.run(shard, cancel).await });
        }
        self.drains.push(Box::new(reader));
    }

    pub fn spawn_event_reader<S, W, H, C>(
        &mut self,
        reader: EventLogReader<S, W, H, C>,
        shards: impl IntoIterator<Item = Shard>,
    ) where
        S: LogStore,
        W: LogWatcher,
        H: EventHandler,
        C: Clock,
    {
        for shard in shards {
            let reader = reader.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move { reader.run(shard, cancel).await });
        }
        self.drains.push(Box::new(reader));
    }

    /// Start the trim loop and the statistics loop of every shard
    pub fn spawn_trimmer<S: LogStore, C: Clock>(
        &mut self,
        trimmer: LogTrimmer<S, C>,
        shards: impl IntoIterator<Item = Shard>,
    ) {
        for shard in shards {
            let trim = trimmer.clone();
            let cancel = self.cancel.clone();
            let trim_shard = shard.clone();
            self.tasks.spawn(async move { trim.run(trim_shard, cancel).await });

            let stats = trimmer.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(async move { stats.run_statistics(shard, cancel).await });
        }
    }

    /// Stop every loop and join reprocessing; returns how many tasks were abandoned
    pub async fn shutdown(mut self, timeout: Duration) -> usize {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut abandoned = 0;
        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(e))) => tracing::error!(error = %e, "worker task failed"),
                Ok(None) => break,
                Err(_) => {
                    abandoned += self.tasks.len();
                    tracing::warn!(count = self.tasks.len(), "workers did not stop in time");
                    self.tasks.abort_all();
                    break;
                }
            }
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        for drain in &self.drains {
            abandoned += drain.drain(remaining).await;
        }
        tracing::info!(abandoned, "workers stopped");
        abandoned
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
