// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jittered periods and exponential retry delays

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A period of `base ± base * spread`, re-drawn on every call to [`next`].
///
/// [`next`]: RandomDuration::next
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomDuration {
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    #[serde(default)]
    pub spread: f64,
}

impl RandomDuration {
    pub fn new(base: Duration, spread: f64) -> Self {
        Self {
            base,
            spread: spread.clamp(0.0, 1.0),
        }
    }

    pub fn fixed(base: Duration) -> Self {
        Self::new(base, 0.0)
    }

    pub fn next(&self) -> Duration {
        jitter(self.base, self.spread)
    }

    pub fn min(&self) -> Duration {
        self.base.mul_f64(1.0 - self.spread.clamp(0.0, 1.0))
    }

    pub fn max(&self) -> Duration {
        self.base.mul_f64(1.0 + self.spread.clamp(0.0, 1.0))
    }
}

/// Exponential backoff from `min` to `max`, with per-attempt jitter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryDelays {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_spread")]
    pub spread: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_spread() -> f64 {
    0.1
}

impl RetryDelays {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            multiplier: default_multiplier(),
            spread: default_spread(),
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay before retry number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = (self.min.as_secs_f64() * factor).min(self.max.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max)
    }

    /// Jittered delay before retry number `attempt`, never above `max`
    pub fn delay(&self, attempt: u32) -> Duration {
        jitter(self.base_delay(attempt), self.spread).min(self.max)
    }
}

fn jitter(base: Duration, spread: f64) -> Duration {
    let spread = spread.clamp(0.0, 1.0);
    if spread == 0.0 || base.is_zero() {
        return base;
    }
    let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
    base.mul_f64(factor)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
