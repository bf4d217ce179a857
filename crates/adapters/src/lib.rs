// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Change signalling between log writers and log processors

mod marker;
pub mod notify;
pub mod traced;
pub mod watch;

pub use marker::{marker_path, touch_marker};
pub use notify::{CompletionNotifier, FileTouchNotifier, NoOpNotifier, NotifyError};
pub use traced::{TracedNotifier, TracedWatcher};
pub use watch::{
    ChangeWaiter, FileLogWatcher, LocalLogWatcher, LogWatcher, NoOpLogWatcher, ShardSignals,
    WatchError,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifier, NotifyCall};
