// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Operation scopes and the per-shard loops that replicate their logs

mod batch;
mod completion;
mod error;
mod event_reader;
mod fault;
mod handler;
mod operation_reader;
mod reprocess;
mod scope;
mod shard_state;
mod supervise;
mod trimmer;
mod workers;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use batch::BatchOutcome;
pub use completion::{touched_kinds, CommitListener, CompletionListener, LogWatchers};
pub use error::{HandlerError, LogError, ScopeError, ScopeOutcome};
pub use event_reader::EventLogReader;
pub use fault::{FaultInjector, FaultPoint, InjectedFault, NoFaults};
pub use handler::{EventHandler, OperationHandler};
pub use operation_reader::OperationLogReader;
pub use reprocess::ReprocessRegistry;
pub use scope::{OperationScope, ScopeFactory};
pub use shard_state::{ShardMap, ShardState};
pub use supervise::{run_supervised, sleep_or_cancel};
pub use trimmer::LogTrimmer;
pub use workers::{ReprocessDrain, ShardWorkers};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fault::ScriptedFaults;
