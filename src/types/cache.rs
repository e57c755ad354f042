// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Strong types for cache metadata
//!
//! - [`TimestampNanos`]: Unix timestamp in nanoseconds, the unit used by the
//!   combiner alert cache snapshot

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unix timestamp in nanoseconds.
///
/// Snapshot files store expirations in nanoseconds so entries written by one
/// process compare exactly against the clock of the next.
///
/// # Examples
///
/// ```
/// use alertscan::TimestampNanos;
/// use std::time::Duration;
///
/// let now = TimestampNanos::now();
/// let later = now.saturating_add(Duration::from_secs(60));
/// assert!(later > now);
/// assert!(!later.is_past());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampNanos(i64);

impl TimestampNanos {
    /// Creates a timestamp representing the current time
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(i64::try_from(nanos).unwrap_or(i64::MAX))
    }

    /// Creates a timestamp from a raw nanosecond value
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the raw nanosecond value
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Returns this timestamp moved forward by `duration`, saturating at the maximum
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let delta = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    /// Returns `true` once the current time has passed this timestamp
    pub fn is_past(&self) -> bool {
        Self::now() > *self
    }
}
