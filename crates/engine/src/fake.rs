// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording handlers for tests
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::error::HandlerError;
use crate::handler::{EventHandler, OperationHandler};
use async_trait::async_trait;
use oplog_core::{EventEntry, Operation, Shard};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Scripted outcome for one key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scripted {
    Transient,
    Failed,
}

struct Recorder<T> {
    started: Mutex<Vec<T>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    handled: Mutex<Vec<T>>,
    attempts: Mutex<Vec<T>>,
    failures: Mutex<HashMap<String, VecDeque<Scripted>>>,
    delay: Mutex<Option<Duration>>,
    changed: Notify,
}

impl<T: Clone> Recorder<T> {
    fn new() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            handled: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            changed: Notify::new(),
        }
    }

    fn fail(&self, key: String, outcome: Scripted, times: usize) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.entry(key).or_default().extend(std::iter::repeat(outcome).take(times));
    }

    async fn record(&self, key: &str, item: T) -> Result<(), HandlerError> {
        self.started.lock().unwrap_or_else(|e| e.into_inner()).push(item.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = self.complete(key, item).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.changed.notify_waiters();
        result
    }

    async fn complete(&self, key: &str, item: T) -> Result<(), HandlerError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).push(item.clone());
        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(Scripted::Transient) => Err(HandlerError::Transient(format!("scripted failure of {key}"))),
            Some(Scripted::Failed) => Err(HandlerError::Failed(format!("scripted failure of {key}"))),
            None => {
                self.handled.lock().unwrap_or_else(|e| e.into_inner()).push(item);
                Ok(())
            }
        }
    }

    fn started(&self) -> Vec<T> {
        self.started.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn handled(&self) -> Vec<T> {
        self.handled.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn attempts(&self) -> usize {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if self.handled.lock().unwrap_or_else(|e| e.into_inner()).len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Records every operation it successfully handles
#[derive(Clone)]
pub struct RecordingOperationHandler {
    recorder: Arc<Recorder<Operation>>,
}

impl Default for RecordingOperationHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingOperationHandler {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::new()),
        }
    }

    /// Fail the next `times` deliveries of operation `id`
    pub fn fail(&self, id: impl Into<String>, outcome: Scripted, times: usize) {
        self.recorder.fail(id.into(), outcome, times);
    }

    /// Sleep before every delivery
    pub fn set_delay(&self, delay: Duration) {
        *self.recorder.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn handled(&self) -> Vec<Operation> {
        self.recorder.handled()
    }

    /// Indices of handled operations, in completion order
    pub fn indices(&self) -> Vec<u64> {
        self.handled().iter().filter_map(|op| op.index).collect()
    }

    /// Deliveries including failed ones
    pub fn attempts(&self) -> usize {
        self.recorder.attempts()
    }

    /// Indices in the order deliveries started
    pub fn started_indices(&self) -> Vec<u64> {
        self.recorder.started().iter().filter_map(|op| op.index).collect()
    }

    /// Most deliveries ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.recorder.peak()
    }

    /// Wait until `count` operations were handled; false on timeout
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        self.recorder.wait_for(count, timeout).await
    }
}

#[async_trait]
impl OperationHandler for RecordingOperationHandler {
    async fn handle(&self, _shard: &Shard, operation: &Operation) -> Result<(), HandlerError> {
        self.recorder.record(&operation.id, operation.clone()).await
    }
}

/// Records every event or timer it successfully handles
#[derive(Clone)]
pub struct RecordingEventHandler {
    recorder: Arc<Recorder<EventEntry>>,
}

impl Default for RecordingEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::new()),
        }
    }

    /// Fail the next `times` deliveries of entry `uuid`
    pub fn fail(&self, uuid: impl Into<String>, outcome: Scripted, times: usize) {
        self.recorder.fail(uuid.into(), outcome, times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.recorder.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn handled(&self) -> Vec<EventEntry> {
        self.recorder.handled()
    }

    pub fn uuids(&self) -> Vec<String> {
        self.handled().into_iter().map(|e| e.uuid).collect()
    }

    pub fn attempts(&self) -> usize {
        self.recorder.attempts()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.recorder.peak()
    }

    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        self.recorder.wait_for(count, timeout).await
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle(&self, _shard: &Shard, entry: &EventEntry) -> Result<(), HandlerError> {
        self.recorder.record(&entry.uuid, entry.clone()).await
    }
}
