// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-commit wake-ups for local and remote log processors

use oplog_adapters::{CompletionNotifier, LogWatcher};
use oplog_core::{CompletionSettings, HostId, LogKind, Operation, Shard};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Observer invoked once an operation scope has committed
pub trait CommitListener: Send + Sync + 'static {
    fn on_committed(&self, shard: &Shard, operation: &Operation);
}

/// One watcher per log kind
#[derive(Clone)]
pub struct LogWatchers<W> {
    pub operations: W,
    pub events: W,
    pub timers: W,
}

impl<W: LogWatcher> LogWatchers<W> {
    pub fn new(operations: W, events: W, timers: W) -> Self {
        Self {
            operations,
            events,
            timers,
        }
    }

    pub fn for_kind(&self, kind: LogKind) -> &W {
        match kind {
            LogKind::Operations => &self.operations,
            LogKind::Events => &self.events,
            LogKind::Timers => &self.timers,
        }
    }
}

impl<W: LogWatcher + Default> Default for LogWatchers<W> {
    fn default() -> Self {
        Self::new(W::default(), W::default(), W::default())
    }
}

/// Logs touched by a committed operation
pub fn touched_kinds(operation: &Operation) -> BTreeSet<LogKind> {
    let mut kinds = BTreeSet::from([LogKind::Operations]);
    kinds.extend(operation.prepared_events().iter().map(|e| e.kind));
    kinds
}

/// Wakes the local watchers and notifies other processes after a commit.
///
/// Only operations committed by this host are signalled; operations read
/// back from the log were already signalled by their own host.
pub struct CompletionListener<W, N> {
    inner: Arc<ListenerInner<W, N>>,
}

struct ListenerInner<W, N> {
    host_id: HostId,
    watchers: LogWatchers<W>,
    notifier: N,
    settings: CompletionSettings,
}

impl<W, N> Clone for CompletionListener<W, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: LogWatcher, N: CompletionNotifier> CompletionListener<W, N> {
    pub fn new(host_id: HostId, watchers: LogWatchers<W>, notifier: N, settings: CompletionSettings) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                host_id,
                watchers,
                notifier,
                settings,
            }),
        }
    }

    pub fn watchers(&self) -> &LogWatchers<W> {
        &self.inner.watchers
    }

    /// Signal every log in `kinds`, waiting for the notifier
    pub async fn notify(&self, shard: &Shard, kinds: &BTreeSet<LogKind>) {
        for kind in kinds {
            if let Err(e) = self.inner.watchers.for_kind(*kind).notify_changed(shard).await {
                tracing::warn!(%shard, %kind, error = %e, "local change signal failed");
            }
            self.notify_remote(shard, *kind).await;
        }
    }

    async fn notify_remote(&self, shard: &Shard, kind: LogKind) {
        let settings = &self.inner.settings;
        let attempts = settings.notify_attempts.max(1);
        for attempt in 1..=attempts {
            match self.inner.notifier.notify(shard, kind).await {
                Ok(()) => return,
                Err(e) if attempt < attempts => {
                    tracing::debug!(%shard, %kind, attempt, error = %e, "notify failed, retrying");
                    tokio::time::sleep(settings.retry_delays.delay(attempt)).await;
                }
                Err(e) => {
                    tracing::warn!(%shard, %kind, attempts, error = %e, "notify failed");
                }
            }
        }
    }
}

impl<W: LogWatcher, N: CompletionNotifier> CommitListener for CompletionListener<W, N> {
    fn on_committed(&self, shard: &Shard, operation: &Operation) {
        if operation.host_id != self.inner.host_id {
            tracing::trace!(%shard, operation = %operation.id, "foreign operation, not signalled");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%shard, "no runtime, commit not signalled");
            return;
        };
        let kinds = touched_kinds(operation);
        let listener = self.clone();
        let shard = shard.clone();
        handle.spawn(async move {
            listener.notify(&shard, &kinds).await;
        });
    }
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
