// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marker-file watcher for processes sharing a filesystem
//!
//! `notify_changed` touches `<dir>/<kind>-<shard>.marker`. Every instance
//! watching the same directory polls the marker's modification time and
//! bumps its local generation when it moves.

use super::{ChangeWaiter, LogWatcher, ShardSignals, WatchError};
use crate::marker::{marker_path, touch_marker};
use async_trait::async_trait;
use oplog_core::{FileWatcherSettings, LogKind, Shard};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Last marker time seen per polled shard
///
/// A shard has an entry once its poller is started. Own touches are recorded
/// under the same lock the poller compares against, so they are not seen as
/// foreign changes.
#[derive(Clone, Default)]
struct MarkerTimes {
    seen: Arc<Mutex<HashMap<Shard, Option<SystemTime>>>>,
}

impl MarkerTimes {
    /// Record the baseline for `shard`; false if it is already polled
    fn start(&self, shard: &Shard, path: &Path) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.contains_key(shard) {
            return false;
        }
        seen.insert(shard.clone(), modified(path));
        true
    }

    /// True if the marker moved since the last observation
    fn observe(&self, shard: &Shard, path: &Path) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let current = modified(path);
        let last = seen.entry(shard.clone()).or_insert(None);
        let changed = current.is_some() && current != *last;
        *last = current;
        changed
    }

    fn touch(&self, shard: &Shard, path: &Path) -> io::Result<()> {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let stored = touch_marker(path)?;
        if let Some(last) = seen.get_mut(shard) {
            *last = Some(stored);
        }
        Ok(())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|meta| meta.modified().ok())
}

struct FileWatcherInner {
    dir: PathBuf,
    kind: LogKind,
    poll_interval: Duration,
    signals: ShardSignals,
    marks: MarkerTimes,
    cancel: CancellationToken,
}

impl Drop for FileWatcherInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Clone)]
pub struct FileLogWatcher {
    inner: Arc<FileWatcherInner>,
}

impl FileLogWatcher {
    pub fn new(dir: impl Into<PathBuf>, kind: LogKind) -> Self {
        Self::with_settings(dir, kind, &FileWatcherSettings::default())
    }

    pub fn with_settings(dir: impl Into<PathBuf>, kind: LogKind, settings: &FileWatcherSettings) -> Self {
        Self {
            inner: Arc::new(FileWatcherInner {
                dir: dir.into(),
                kind,
                poll_interval: settings.poll_interval,
                signals: ShardSignals::new(),
                marks: MarkerTimes::default(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn marker_path(&self, shard: &Shard) -> PathBuf {
        marker_path(&self.inner.dir, self.inner.kind, shard)
    }

    pub fn generation(&self, shard: &Shard) -> u64 {
        self.inner.signals.generation(shard)
    }

    /// Stop every marker poller
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Start polling `shard`'s marker once per watcher
    ///
    /// The baseline is read before returning, so any later touch is seen by
    /// the poller.
    fn ensure_polling(&self, shard: &Shard) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%shard, "no runtime, marker file not watched");
            return;
        };
        let path = self.marker_path(shard);
        if !self.inner.marks.start(shard, &path) {
            return;
        }

        let marks = self.inner.marks.clone();
        let signals = self.inner.signals.clone();
        let cancel = self.inner.cancel.clone();
        let interval = self.inner.poll_interval;
        let shard = shard.clone();
        handle.spawn(async move {
            poll_marker(path, shard, marks, signals, interval, cancel).await;
        });
    }
}

async fn poll_marker(
    path: PathBuf,
    shard: Shard,
    marks: MarkerTimes,
    signals: ShardSignals,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(%shard, path = %path.display(), "watching marker");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let (marks, path_ref, shard_ref) = (marks.clone(), path.clone(), shard.clone());
                match tokio::task::spawn_blocking(move || marks.observe(&shard_ref, &path_ref)).await {
                    Ok(true) => {
                        tracing::trace!(%shard, "marker changed");
                        signals.bump(&shard);
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(%shard, error = %e, "marker poll failed"),
                }
            }
        }
    }
    tracing::debug!(%shard, "marker watch stopped");
}

#[async_trait]
impl LogWatcher for FileLogWatcher {
    async fn notify_changed(&self, shard: &Shard) -> Result<(), WatchError> {
        self.inner.signals.bump(shard);
        let path = self.marker_path(shard);
        let (marks, shard) = (self.inner.marks.clone(), shard.clone());
        tokio::task::spawn_blocking(move || marks.touch(&shard, &path))
            .await
            .map_err(|e| WatchError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    fn when_changed(&self, shard: &Shard) -> ChangeWaiter {
        self.ensure_polling(shard);
        self.inner.signals.subscribe(shard)
    }
}
