// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of in-flight reprocessing tasks
//!
//! At most one task runs per entry key (an index for operations, a uuid
//! for events and timers). A task removes itself when it finishes.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<String, (u64, JoinHandle<()>)>,
    last_id: u64,
}

#[derive(Clone, Default)]
pub struct ReprocessRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ReprocessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn `task` for `key` unless one is already running.
    ///
    /// Returns `false` when a task for `key` exists.
    pub fn try_spawn<F>(&self, key: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let mut inner = self.lock();
        if inner.tasks.contains_key(&key) {
            return false;
        }
        inner.last_id += 1;
        let id = inner.last_id;
        let registry = self.clone();
        let task_key = key.clone();
        // The lock is held until the handle is stored, so the task cannot
        // remove its key before it is inserted.
        let handle = tokio::spawn(async move {
            task.await;
            registry.finish(&task_key, id);
        });
        inner.tasks.insert(key, (id, handle));
        true
    }

    fn finish(&self, key: &str, id: u64) {
        let mut inner = self.lock();
        if inner.tasks.get(key).is_some_and(|(task_id, _)| *task_id == id) {
            inner.tasks.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().tasks.contains_key(key)
    }

    pub fn keys(&self) -> HashSet<String> {
        self.lock().tasks.keys().cloned().collect()
    }

    /// Wait up to `timeout` for every running task, then abort the rest.
    ///
    /// Returns the number of abandoned tasks.
    pub async fn join_all(&self, timeout: Duration) -> usize {
        let handles: Vec<(String, JoinHandle<()>)> = self
            .lock()
            .tasks
            .drain()
            .map(|(key, (_, handle))| (key, handle))
            .collect();
        if handles.is_empty() {
            return 0;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut abandoned = 0;
        for (key, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                    tracing::warn!(key, "reprocessing abandoned at shutdown");
                }
            }
        }
        abandoned
    }
}

#[cfg(test)]
#[path = "reprocess_tests.rs"]
mod tests;
