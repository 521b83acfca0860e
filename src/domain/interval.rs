//! Half-open time intervals anchored to a calendar date.
//!
//! A booking occupies `[date + time_start, date + time_end)`. Instants are
//! stored as whole minutes since the Unix epoch so that comparisons are
//! plain integer comparisons, independent of string formatting or
//! floating-point rounding.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

const SECONDS_PER_MINUTE: i64 = 60;

/// A half-open `[start, end)` range of minutes since the Unix epoch.
///
/// Invariant: `start < end`. Enforced by every constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    start: i64,
    end: i64,
}

impl TimeInterval {
    /// Builds an interval from absolute epoch minutes.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidRequest`] if `end <= start`.
    pub fn from_minutes(start: i64, end: i64) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::InvalidRequest(format!(
                "interval end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds the active interval of a booking slot on `date`.
    ///
    /// Seconds are truncated; slots are minute-granular.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidRequest`] if `time_end` is not after
    /// `time_start` once truncated to minutes.
    pub fn on_date(
        date: NaiveDate,
        time_start: NaiveTime,
        time_end: NaiveTime,
    ) -> Result<Self, BookingError> {
        let day = date
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp()
            .div_euclid(SECONDS_PER_MINUTE);
        Self::from_minutes(
            day + minute_of_day(time_start),
            day + minute_of_day(time_end),
        )
    }

    /// Inclusive start, in minutes since the epoch.
    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    /// Exclusive end, in minutes since the epoch.
    #[must_use]
    pub const fn end(&self) -> i64 {
        self.end
    }

    /// Length of the interval in minutes.
    #[must_use]
    pub const fn duration_minutes(&self) -> i64 {
        self.end - self.start
    }

    /// Returns `true` iff the two intervals share at least one instant.
    ///
    /// Adjacent intervals (`self.end == other.start`) do not overlap.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns `true` if `minute` falls inside `[start, end)`.
    #[must_use]
    pub const fn contains(&self, minute: i64) -> bool {
        self.start <= minute && minute < self.end
    }

    /// Converts to UTC instants for range-typed storage columns.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidRequest`] if either bound is outside
    /// the representable timestamp range.
    pub fn to_utc_range(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), BookingError> {
        Ok((minute_to_utc(self.start)?, minute_to_utc(self.end)?))
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_utc_range() {
            Ok((start, end)) => write!(
                f,
                "[{}, {})",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
            Err(_) => write!(f, "[{}, {}) min", self.start, self.end),
        }
    }
}

/// Free-function form of [`TimeInterval::overlaps`].
#[must_use]
pub const fn overlaps(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.overlaps(b)
}

fn minute_of_day(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) / SECONDS_PER_MINUTE
}

fn minute_to_utc(minute: i64) -> Result<DateTime<Utc>, BookingError> {
    minute
        .checked_mul(SECONDS_PER_MINUTE)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| BookingError::InvalidRequest(format!("minute {minute} out of range")))
}
