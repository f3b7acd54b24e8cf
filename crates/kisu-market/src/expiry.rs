//! Listing expiry.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// How long a listing stays up after release.
pub fn listing_lifetime() -> Duration {
    Duration::hours(3)
}

/// Time left before a listing expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemainingTime {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {:02}m {:02}s", self.hours, self.minutes, self.seconds)
    }
}

/// Time left for a listing released at `release_date`, or `None` once it
/// has expired.
pub fn remaining_time(release_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<RemainingTime> {
    let left = release_date + listing_lifetime() - now;
    if left <= Duration::zero() {
        return None;
    }
    let total = left.num_seconds();
    Some(RemainingTime {
        hours: total / 3600,
        minutes: total % 3600 / 60,
        seconds: total % 60,
    })
}
