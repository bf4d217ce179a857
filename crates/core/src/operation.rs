// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory operation and the side-effect events it carries

use crate::id::HostId;
use crate::kind::LogKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What to do when an event's uuid already exists in the log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyConflictStrategy {
    /// Reject the commit with a duplicate-key error
    #[default]
    Fail,
    /// Keep the existing row untouched
    Ignore,
    /// Replace the existing row; only legal while it is still `New`
    Update,
}

/// A side-effect record committed in the same transaction as its operation.
///
/// Events are consumed by exactly one host once `delay_until` has passed.
/// Timers are the same thing with the time phrased as a firing time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub uuid: String,
    pub kind: LogKind,
    pub value: Value,
    /// Earliest processing time; `None` means the commit time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conflict_strategy: KeyConflictStrategy,
}

impl OperationEvent {
    pub fn new(uuid: impl Into<String>, value: Value) -> Self {
        Self {
            uuid: uuid.into(),
            kind: LogKind::Events,
            value,
            delay_until: None,
            conflict_strategy: KeyConflictStrategy::Fail,
        }
    }

    /// A deferred command that fires at `fires_at`
    pub fn timer(uuid: impl Into<String>, fires_at: DateTime<Utc>, value: Value) -> Self {
        Self {
            uuid: uuid.into(),
            kind: LogKind::Timers,
            value,
            delay_until: Some(fires_at),
            conflict_strategy: KeyConflictStrategy::Fail,
        }
    }

    pub fn with_delay_until(mut self, delay_until: DateTime<Utc>) -> Self {
        self.delay_until = Some(delay_until);
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: KeyConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }
}

/// One logical business transaction.
///
/// `index` stays `None` until the operation's log row has been committed and
/// the store handed back its sequence value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub host_id: HostId,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub commit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub command: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_operations: Vec<Value>,
    #[serde(skip)]
    pub index: Option<u64>,
    #[serde(skip)]
    pub events: Vec<OperationEvent>,
}

impl Operation {
    pub fn new(id: impl Into<String>, host_id: HostId, start_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            host_id,
            start_time,
            commit_time: None,
            command: None,
            items: BTreeMap::new(),
            nested_operations: Vec::new(),
            index: None,
            events: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: Value) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_item(mut self, key: impl Into<String>, value: Value) -> Self {
        self.items.insert(key.into(), value);
        self
    }

    pub fn with_event(mut self, event: OperationEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn item(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    /// True once the log row exists and its index is known
    pub fn is_committed(&self) -> bool {
        self.index.is_some()
    }

    /// Events as they will be written: null values dropped, the last event
    /// wins for a repeated uuid, ordered by uuid so concurrent writers lock
    /// rows in the same order.
    pub fn prepared_events(&self) -> Vec<OperationEvent> {
        let mut by_uuid: BTreeMap<&str, &OperationEvent> = BTreeMap::new();
        for event in &self.events {
            by_uuid.insert(event.uuid.as_str(), event);
        }
        by_uuid
            .into_values()
            .filter(|e| !e.value.is_null())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
