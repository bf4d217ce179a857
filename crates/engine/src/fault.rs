// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fault injection at commit points
//!
//! Scopes and exclusive readers consult an injector right before committing.
//! Production wiring passes [`NoFaults`].

use oplog_core::Shard;
use std::fmt;
use thiserror::Error;

/// Where a fault can be injected
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Before an operation scope commits its transaction
    ScopeCommit,
    /// Before an exclusive reader commits a claimed batch or reprocessed entry
    ClaimCommit,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPoint::ScopeCommit => f.write_str("scope commit"),
            FaultPoint::ClaimCommit => f.write_str("claim commit"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("injected fault at {point}")]
pub struct InjectedFault {
    pub point: FaultPoint,
    pub transient: bool,
}

pub trait FaultInjector: Send + Sync + 'static {
    fn check(&self, point: FaultPoint, shard: &Shard) -> Result<(), InjectedFault>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn check(&self, _point: FaultPoint, _shard: &Shard) -> Result<(), InjectedFault> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedFaults;

#[cfg(any(test, feature = "test-support"))]
mod scripted {
    #![cfg_attr(coverage_nightly, coverage(off))]

    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        pending: HashMap<FaultPoint, Vec<bool>>,
        fired: Vec<(FaultPoint, Shard)>,
    }

    /// Injector that fails the next N checks at a point
    #[derive(Clone, Default)]
    pub struct ScriptedFaults {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedFaults {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next check at `point`
        pub fn fail_next(&self, point: FaultPoint, transient: bool) {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.pending.entry(point).or_default().push(transient);
        }

        /// Faults that fired so far
        pub fn fired(&self) -> Vec<(FaultPoint, Shard)> {
            self.script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .fired
                .clone()
        }
    }

    impl FaultInjector for ScriptedFaults {
        fn check(&self, point: FaultPoint, shard: &Shard) -> Result<(), InjectedFault> {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            let queue = script.pending.entry(point).or_default();
            if queue.is_empty() {
                return Ok(());
            }
            let transient = queue.remove(0);
            script.fired.push((point, shard.clone()));
            Err(InjectedFault { point, transient })
        }
    }
}
