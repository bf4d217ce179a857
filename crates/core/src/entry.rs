// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rows written to the operation, event and timer logs

use crate::id::HostId;
use crate::kind::{LogEntryState, LogKind};
use crate::operation::{Operation, OperationEvent};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An indexed row of the co-processed operations log.
///
/// Immutable once written; every host reads it independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub index: u64,
    /// Operation id, used to verify ambiguous commits
    pub uuid: String,
    pub host_id: HostId,
    pub logged_at: DateTime<Utc>,
    pub payload: Value,
}

impl OperationEntry {
    /// Build the row for `operation`. The index is filled in by the store.
    pub fn from_operation(
        operation: &Operation,
        logged_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            index: 0,
            uuid: operation.id.clone(),
            host_id: operation.host_id.clone(),
            logged_at,
            payload: serde_json::to_value(operation)?,
        })
    }

    /// Decode the operation this row was written for
    pub fn to_operation(&self) -> Result<Operation, serde_json::Error> {
        let mut operation: Operation = serde_json::from_value(self.payload.clone())?;
        operation.index = Some(self.index);
        if operation.commit_time.is_none() {
            operation.commit_time = Some(self.logged_at);
        }
        Ok(operation)
    }
}

/// A uuid-keyed row of an event or timer log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub uuid: String,
    pub kind: LogKind,
    pub version: u64,
    pub state: LogEntryState,
    pub logged_at: DateTime<Utc>,
    pub delay_until: DateTime<Utc>,
    pub value: Value,
}

impl EventEntry {
    pub fn from_event(event: &OperationEvent, logged_at: DateTime<Utc>) -> Self {
        Self {
            uuid: event.uuid.clone(),
            kind: event.kind,
            version: 1,
            state: LogEntryState::New,
            logged_at,
            delay_until: event.delay_until.unwrap_or(logged_at),
            value: event.value.clone(),
        }
    }

    /// Eligible for processing at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == LogEntryState::New && self.delay_until <= now
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}
