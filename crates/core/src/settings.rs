// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader, trimmer, scope and notifier settings
//!
//! Every struct deserializes with `#[serde(default)]`, so a TOML file only
//! needs to name the values it overrides. Durations use humantime strings
//! (`"5s"`, `"30m"`).

use crate::kind::LogKind;
use crate::retry::{RandomDuration, RetryDelays};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Transaction isolation requested from the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// What an exclusive reader does with an entry it could not process after
/// every reprocessing attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardPolicy {
    /// Mark the entry `Discarded` so it is never picked up again
    #[default]
    Discard,
    /// Leave the entry `New`; the next batch retries it
    Keep,
}

fn default_concurrency_level() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (4 * cpus).max(4)
}

/// Co-processed operations log reader
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationReaderSettings {
    pub batch_size: usize,
    pub concurrency_level: usize,
    /// Forced re-check when no change notification arrives
    pub check_period: RandomDuration,
    /// How far back a fresh reader starts
    #[serde(with = "humantime_serde")]
    pub start_offset: Duration,
    /// Delay before the first reprocessing attempt of a gap
    pub reprocess_delay: RandomDuration,
    pub reprocess_attempts: u32,
    pub reprocess_delays: RetryDelays,
    /// Backoff of the supervised loop after a failed cycle
    pub retry_delays: RetryDelays,
}

impl Default for OperationReaderSettings {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency_level: default_concurrency_level(),
            check_period: RandomDuration::new(Duration::from_secs(5), 0.1),
            start_offset: Duration::from_secs(3),
            reprocess_delay: RandomDuration::new(Duration::from_millis(500), 0.5),
            reprocess_attempts: 4,
            reprocess_delays: RetryDelays::new(Duration::from_millis(250), Duration::from_secs(5)),
            retry_delays: RetryDelays::new(Duration::from_secs(1), Duration::from_secs(5)),
        }
    }
}

impl OperationReaderSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level;
        self
    }

    pub fn with_check_period(mut self, period: RandomDuration) -> Self {
        self.check_period = period;
        self
    }

    pub fn with_start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_reprocess(mut self, delay: RandomDuration, attempts: u32, delays: RetryDelays) -> Self {
        self.reprocess_delay = delay;
        self.reprocess_attempts = attempts;
        self.reprocess_delays = delays;
        self
    }

    pub fn with_retry_delays(mut self, delays: RetryDelays) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_batch(self.batch_size, self.concurrency_level)
    }
}

/// Exclusive (uno-processed) reader for events and timers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventReaderSettings {
    pub batch_size: usize,
    pub concurrency_level: usize,
    pub check_period: RandomDuration,
    pub reprocess_delay: RandomDuration,
    /// Attempts per reprocessing phase (process, then discard)
    pub reprocess_attempts: u32,
    pub reprocess_delays: RetryDelays,
    pub discard_policy: DiscardPolicy,
    /// Pause when every batch slot is taken by reprocessing
    #[serde(with = "humantime_serde")]
    pub busy_delay: Duration,
    pub retry_delays: RetryDelays,
}

impl Default for EventReaderSettings {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency_level: default_concurrency_level(),
            check_period: RandomDuration::new(Duration::from_secs(5), 0.1),
            reprocess_delay: RandomDuration::new(Duration::from_millis(500), 0.5),
            reprocess_attempts: 3,
            reprocess_delays: RetryDelays::new(Duration::from_millis(500), Duration::from_secs(2)),
            discard_policy: DiscardPolicy::Discard,
            busy_delay: Duration::from_millis(250),
            retry_delays: RetryDelays::new(Duration::from_secs(1), Duration::from_secs(5)),
        }
    }
}

impl EventReaderSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level;
        self
    }

    pub fn with_check_period(mut self, period: RandomDuration) -> Self {
        self.check_period = period;
        self
    }

    pub fn with_reprocess(mut self, delay: RandomDuration, attempts: u32, delays: RetryDelays) -> Self {
        self.reprocess_delay = delay;
        self.reprocess_attempts = attempts;
        self.reprocess_delays = delays;
        self
    }

    pub fn with_discard_policy(mut self, policy: DiscardPolicy) -> Self {
        self.discard_policy = policy;
        self
    }

    pub fn with_busy_delay(mut self, delay: Duration) -> Self {
        self.busy_delay = delay;
        self
    }

    pub fn with_retry_delays(mut self, delays: RetryDelays) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_batch(self.batch_size, self.concurrency_level)
    }
}

/// Retention and statistics for one log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmerSettings {
    /// Entries older than this are deleted; `None` uses the log kind's default
    #[serde(with = "humantime_serde")]
    pub max_entry_age: Option<Duration>,
    pub batch_size: usize,
    pub check_period: RandomDuration,
    pub statistics_period: RandomDuration,
    pub retry_delays: RetryDelays,
}

impl Default for TrimmerSettings {
    fn default() -> Self {
        Self {
            max_entry_age: None,
            batch_size: 4096,
            check_period: RandomDuration::new(Duration::from_secs(15 * 60), 0.25),
            statistics_period: RandomDuration::new(Duration::from_secs(60 * 60), 0.1),
            retry_delays: RetryDelays::new(Duration::from_secs(15), Duration::from_secs(10 * 60)),
        }
    }
}

impl TrimmerSettings {
    pub fn with_max_entry_age(mut self, age: Duration) -> Self {
        self.max_entry_age = Some(age);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_check_period(mut self, period: RandomDuration) -> Self {
        self.check_period = period;
        self
    }

    pub fn with_statistics_period(mut self, period: RandomDuration) -> Self {
        self.statistics_period = period;
        self
    }

    pub fn with_retry_delays(mut self, delays: RetryDelays) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Retention for `kind`: operations are kept 30 minutes, events and timers an hour
    pub fn max_entry_age_for(&self, kind: LogKind) -> Duration {
        self.max_entry_age.unwrap_or(match kind {
            LogKind::Operations => Duration::from_secs(30 * 60),
            LogKind::Events | LogKind::Timers => Duration::from_secs(60 * 60),
        })
    }

    /// Delay before the first trim after start-up
    pub fn initial_delay(&self) -> Duration {
        self.check_period.base.mul_f64(0.1)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_size == 0 {
            return Err(SettingsError::Invalid {
                field: "batch_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub isolation_level: IsolationLevel,
}

/// Cross-process notification after a commit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub notify_attempts: u32,
    pub retry_delays: RetryDelays,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            notify_attempts: 3,
            retry_delays: RetryDelays::new(Duration::from_millis(50), Duration::from_secs(1)),
        }
    }
}

/// Marker-file watcher shared by processes on one machine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileWatcherSettings {
    pub marker_dir: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for FileWatcherSettings {
    fn default() -> Self {
        Self {
            marker_dir: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// All settings, loadable from one TOML document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub operation_reader: OperationReaderSettings,
    pub event_reader: EventReaderSettings,
    pub timer_reader: EventReaderSettings,
    pub operation_trimmer: TrimmerSettings,
    pub event_trimmer: TrimmerSettings,
    pub timer_trimmer: TrimmerSettings,
    pub scope: ScopeSettings,
    pub completion: CompletionSettings,
    pub file_watcher: FileWatcherSettings,
}

impl LogSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: LogSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn reader_for(&self, kind: LogKind) -> Option<&EventReaderSettings> {
        match kind {
            LogKind::Operations => None,
            LogKind::Events => Some(&self.event_reader),
            LogKind::Timers => Some(&self.timer_reader),
        }
    }

    pub fn trimmer_for(&self, kind: LogKind) -> &TrimmerSettings {
        match kind {
            LogKind::Operations => &self.operation_trimmer,
            LogKind::Events => &self.event_trimmer,
            LogKind::Timers => &self.timer_trimmer,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.operation_reader.validate()?;
        self.event_reader.validate()?;
        self.timer_reader.validate()?;
        for kind in LogKind::ALL {
            self.trimmer_for(kind).validate()?;
        }
        Ok(())
    }
}

fn validate_batch(batch_size: usize, concurrency_level: usize) -> Result<(), SettingsError> {
    if batch_size == 0 {
        return Err(SettingsError::Invalid {
            field: "batch_size",
            reason: "must be positive",
        });
    }
    if concurrency_level == 0 {
        return Err(SettingsError::Invalid {
            field: "concurrency_level",
            reason: "must be positive",
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
