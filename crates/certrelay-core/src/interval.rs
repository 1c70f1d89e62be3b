//! `<int><d|h|m|s>` schedule intervals.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted interval: 366 days.
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Unit of a [`ScheduleInterval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            's' => Some(IntervalUnit::Seconds),
            'm' => Some(IntervalUnit::Minutes),
            'h' => Some(IntervalUnit::Hours),
            'd' => Some(IntervalUnit::Days),
            _ => None,
        }
    }

    pub fn suffix(&self) -> char {
        match self {
            IntervalUnit::Seconds => 's',
            IntervalUnit::Minutes => 'm',
            IntervalUnit::Hours => 'h',
            IntervalUnit::Days => 'd',
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 60 * 60,
            IntervalUnit::Days => 24 * 60 * 60,
        }
    }
}

/// Interval between scheduled pipeline runs.
///
/// The magnitude is always positive and the total never exceeds
/// [`MAX_INTERVAL_SECS`]; construction goes through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleInterval {
    magnitude: u64,
    unit: IntervalUnit,
}

impl ScheduleInterval {
    pub fn magnitude(&self) -> u64 {
        self.magnitude
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.magnitude * self.unit.seconds())
    }
}

impl FromStr for ScheduleInterval {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::Interval {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim().to_ascii_lowercase();
        let suffix = trimmed
            .chars()
            .last()
            .ok_or_else(|| invalid("empty value"))?;
        let unit = IntervalUnit::from_suffix(suffix)
            .ok_or_else(|| invalid("expected a d, h, m or s suffix (e.g. 1d, 12h, 30m, 45s)"))?;

        let digits = &trimmed[..trimmed.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("magnitude must be a positive integer"));
        }
        let magnitude: u64 = digits
            .parse()
            .map_err(|_| invalid("magnitude is out of range"))?;
        if magnitude == 0 {
            return Err(invalid("magnitude must be greater than zero"));
        }
        match magnitude.checked_mul(unit.seconds()) {
            Some(total) if total <= MAX_INTERVAL_SECS => {}
            _ => return Err(invalid("interval must not exceed 366 days")),
        }

        Ok(ScheduleInterval { magnitude, unit })
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}
