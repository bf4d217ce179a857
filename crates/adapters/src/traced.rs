// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::notify::{CompletionNotifier, NotifyError};
use crate::watch::{ChangeWaiter, LogWatcher, WatchError};
use async_trait::async_trait;
use oplog_core::{LogKind, Shard};
use tracing::Instrument;

/// Wrapper that adds tracing to any CompletionNotifier
#[derive(Clone)]
pub struct TracedNotifier<N> {
    inner: N,
}

impl<N> TracedNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: CompletionNotifier> CompletionNotifier for TracedNotifier<N> {
    async fn notify(&self, shard: &Shard, kind: LogKind) -> Result<(), NotifyError> {
        let span = tracing::debug_span!("notifier.notify", %shard, %kind);

        let start = std::time::Instant::now();
        let result = self.inner.notify(shard, kind).instrument(span.clone()).await;
        let elapsed = start.elapsed();

        let _guard = span.enter();
        match &result {
            Ok(()) => tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "notified"),
            Err(e) => tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "notify failed"
            ),
        }

        result
    }
}

/// Wrapper that adds tracing to any LogWatcher
#[derive(Clone)]
pub struct TracedWatcher<W> {
    inner: W,
}

impl<W> TracedWatcher<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: LogWatcher> LogWatcher for TracedWatcher<W> {
    async fn notify_changed(&self, shard: &Shard) -> Result<(), WatchError> {
        let result = self.inner.notify_changed(shard).await;
        match &result {
            Ok(()) => tracing::trace!(%shard, "change signalled"),
            Err(e) => tracing::warn!(%shard, error = %e, "change signal failed"),
        }
        result
    }

    fn when_changed(&self, shard: &Shard) -> ChangeWaiter {
        tracing::trace!(%shard, "waiting for change");
        self.inner.when_changed(shard)
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
