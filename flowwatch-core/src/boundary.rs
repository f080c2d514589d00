//! Window boundary arithmetic.
//!
//! Windows are aligned to multiples of `bucket_count * bucket_unit` since the
//! Unix epoch, so with 60 second buckets and 5 buckets per window every window
//! starts on a minute divisible by five with zeroed seconds.
//!
//! Indices are derived from elapsed units rather than clock fields, which keeps
//! them correct across hour and day rollover.

use crate::error::FlowError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default number of buckets per window.
pub const DEFAULT_BUCKET_COUNT: u32 = 5;

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_UNIT_SECS: i64 = 60;

/// Widest window accepted, roughly one hundred years.
pub const MAX_WINDOW_SECS: i64 = 100 * 366 * 86_400;

/// Start of the window enclosing `t`.
///
/// Zero `bucket_unit_secs` or `bucket_count` are treated as one.
pub fn boundary_start(t: DateTime<Utc>, bucket_unit_secs: i64, bucket_count: u32) -> DateTime<Utc> {
    let width_secs = bucket_unit_secs.max(1) * i64::from(bucket_count.max(1));
    let offset_secs = t.timestamp().rem_euclid(width_secs);

    t - Duration::seconds(offset_secs) - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// Whole bucket units elapsed between `window_start` and `t` (negative if `t` precedes it).
pub fn units_since(t: DateTime<Utc>, window_start: DateTime<Utc>, bucket_unit_secs: i64) -> i64 {
    let unit_ms = bucket_unit_secs.max(1) * 1000;
    (t - window_start).num_milliseconds().div_euclid(unit_ms)
}

/// Index of `t` within the window starting at `window_start`, always in `0..bucket_count`.
pub fn bucket_index(
    t: DateTime<Utc>,
    window_start: DateTime<Utc>,
    bucket_unit_secs: i64,
    bucket_count: u32,
) -> usize {
    let count = i64::from(bucket_count.max(1));
    let units = units_since(t, window_start, bucket_unit_secs);

    (((units % count) + count) % count) as usize
}

/// Absolute bucket unit number of `t` since the epoch.
///
/// Two instants share a bucket unit exactly when they fall in the same minute
/// (for 60 second buckets).
pub fn unit_number(t: DateTime<Utc>, bucket_unit_secs: i64) -> i64 {
    t.timestamp().div_euclid(bucket_unit_secs.max(1))
}

/// Validated window shape: `bucket_count` buckets of `bucket_unit_secs` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct WindowGeometry {
    bucket_count: u32,
    bucket_unit_secs: i64,
}

impl WindowGeometry {
    pub fn new(bucket_count: u32, bucket_unit_secs: i64) -> Result<Self, FlowError> {
        if bucket_count == 0 {
            return Err(FlowError::EmptyWindow);
        }
        let width_secs = bucket_unit_secs.checked_mul(i64::from(bucket_count));
        if bucket_unit_secs < 1 || !width_secs.is_some_and(|w| w <= MAX_WINDOW_SECS) {
            return Err(FlowError::InvalidBucketUnit(bucket_unit_secs));
        }

        Ok(Self {
            bucket_count,
            bucket_unit_secs,
        })
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn bucket_unit_secs(&self) -> i64 {
        self.bucket_unit_secs
    }

    pub fn bucket_unit(&self) -> Duration {
        Duration::seconds(self.bucket_unit_secs)
    }

    /// Full window span.
    pub fn width(&self) -> Duration {
        Duration::seconds(self.bucket_unit_secs * i64::from(self.bucket_count))
    }

    pub fn boundary_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        boundary_start(t, self.bucket_unit_secs, self.bucket_count)
    }

    pub fn bucket_index(&self, t: DateTime<Utc>, window_start: DateTime<Utc>) -> usize {
        bucket_index(t, window_start, self.bucket_unit_secs, self.bucket_count)
    }

    pub fn unit_number(&self, t: DateTime<Utc>) -> i64 {
        unit_number(t, self.bucket_unit_secs)
    }

    /// Start time of bucket `index` in the window starting at `window_start`.
    pub fn bucket_time(&self, window_start: DateTime<Utc>, index: usize) -> DateTime<Utc> {
        window_start + Duration::seconds(self.bucket_unit_secs * index as i64)
    }

    /// First instant after the window starting at `window_start`.
    pub fn window_end(&self, window_start: DateTime<Utc>) -> DateTime<Utc> {
        window_start + self.width()
    }
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            bucket_unit_secs: DEFAULT_BUCKET_UNIT_SECS,
        }
    }
}
