//! Dual clock for real and fiction time
//!
//! Provides the time base for timers and game-time conditions:
//! - `ClockConfig` - Multiplier and starting fiction timestamp
//! - `GameClock` - Elapsed session time on both clocks
//! - `TimeMode` - Which clock a timer measures against
//!
//! Fiction time advances as `wall * multiplier`, so a multiplier of 60 turns
//! one real minute into one fiction hour. Rule actions cannot touch the
//! clock; only the host can reconfigure it.

use crate::{ConfigError, Result};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Which clock a timer is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeMode {
    /// Session-active wall-clock time
    #[default]
    RealTime,
    /// In-fiction time
    GameTime,
}

/// Clock configuration, read at session start and on admin updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Fiction seconds per real second
    pub multiplier: f64,
    /// Fiction timestamp at the start of the session
    #[serde(default)]
    pub start: NaiveDateTime,
}

impl ClockConfig {
    pub fn new(multiplier: f64, start: NaiveDateTime) -> Self {
        Self { multiplier, start }
    }

    /// Reject multipliers that would stop or reverse fiction time
    pub fn validate(&self) -> Result<()> {
        validate_multiplier(self.multiplier)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            start: NaiveDateTime::default(),
        }
    }
}

fn validate_multiplier(multiplier: f64) -> Result<()> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMultiplier(multiplier))
    }
}

/// Session clock state
///
/// Both elapsed counters only grow, so reads between `advance` calls are
/// stable and fiction time is non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    multiplier: f64,
    start: NaiveDateTime,
    real_elapsed: Duration,
    fiction_elapsed: Duration,
}

impl GameClock {
    /// Create a clock from validated configuration
    pub fn new(config: &ClockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            multiplier: config.multiplier,
            start: config.start,
            real_elapsed: Duration::ZERO,
            fiction_elapsed: Duration::ZERO,
        })
    }

    /// Advance by a wall-clock delta, returning the fiction delta
    ///
    /// Both counters saturate at `Duration::MAX` instead of overflowing.
    pub fn advance(&mut self, wall: Duration) -> Duration {
        let fiction = Duration::try_from_secs_f64(wall.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        self.real_elapsed = self.real_elapsed.saturating_add(wall);
        self.fiction_elapsed = self.fiction_elapsed.saturating_add(fiction);
        fiction
    }

    /// Current in-fiction timestamp
    pub fn current_fiction_time(&self) -> NaiveDateTime {
        TimeDelta::from_std(self.fiction_elapsed)
            .ok()
            .and_then(|delta| self.start.checked_add_signed(delta))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Elapsed session-active real time
    pub fn real_elapsed(&self) -> Duration {
        self.real_elapsed
    }

    /// Elapsed fiction time since the configured start
    pub fn fiction_elapsed(&self) -> Duration {
        self.fiction_elapsed
    }

    /// Elapsed seconds on the clock a timer measures against
    pub fn reading(&self, mode: TimeMode) -> f64 {
        match mode {
            TimeMode::RealTime => self.real_elapsed.as_secs_f64(),
            TimeMode::GameTime => self.fiction_elapsed.as_secs_f64(),
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Admin update: change the multiplier for future advances
    pub fn reconfigure(&mut self, multiplier: f64) -> Result<()> {
        validate_multiplier(multiplier)?;
        self.multiplier = multiplier;
        Ok(())
    }

    /// Admin update: relabel the current fiction time
    ///
    /// Elapsed counters are kept so game-time timers stay on schedule.
    pub fn set_fiction_time(&mut self, now: NaiveDateTime) {
        let elapsed = TimeDelta::from_std(self.fiction_elapsed).unwrap_or(TimeDelta::zero());
        self.start = now.checked_sub_signed(elapsed).unwrap_or(now);
    }

    /// Read-only view of the fiction time fields conditions compare against
    pub fn fiction_reading(&self) -> FictionReading {
        let now = self.current_fiction_time();
        let elapsed = self.fiction_elapsed.as_secs_f64();
        FictionReading {
            timestamp: now,
            elapsed_seconds: elapsed,
            elapsed_days: (elapsed / SECONDS_PER_DAY).floor() as i64,
            hour: now.hour(),
            minute: now.minute(),
        }
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            start: NaiveDateTime::default(),
            real_elapsed: Duration::ZERO,
            fiction_elapsed: Duration::ZERO,
        }
    }
}

/// Fiction time captured for one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FictionReading {
    pub timestamp: NaiveDateTime,
    pub elapsed_seconds: f64,
    pub elapsed_days: i64,
    pub hour: u32,
    pub minute: u32,
}
