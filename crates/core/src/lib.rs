// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oplog-core: shared model for the database-backed operation log
//!
//! This crate provides:
//! - Shard keys and the closed set of log kinds
//! - The in-memory `Operation` and the rows written to each log
//! - Clock and id abstractions for testable time and identity
//! - Retry/jitter delay sequences and TOML-loadable settings

pub mod clock;
pub mod entry;
pub mod id;
pub mod kind;
pub mod operation;
pub mod retry;
pub mod settings;
pub mod shard;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use entry::{EventEntry, OperationEntry};
pub use id::{HostId, IdGen, SequentialIdGen, UuidIdGen};
pub use kind::{LogEntryState, LogKind};
pub use operation::{KeyConflictStrategy, Operation, OperationEvent};
pub use retry::{RandomDuration, RetryDelays};
pub use settings::{
    CompletionSettings, DiscardPolicy, EventReaderSettings, FileWatcherSettings, IsolationLevel,
    LogSettings, OperationReaderSettings, ScopeSettings, SettingsError, TrimmerSettings,
};
pub use shard::Shard;
