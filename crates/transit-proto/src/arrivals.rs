//! Countdown formatting for upcoming arrivals.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::protocol::Station;

/// Time remaining until one arrival, as shown on a station card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalEta {
    /// Less than a minute away (or already past).
    Now,
    Minutes(i64),
    /// Timestamp outside the range chrono can represent.
    Invalid,
}

impl ArrivalEta {
    /// Whole minutes from `now` until `epoch_secs`, floored and clamped at 0.
    pub fn until(epoch_secs: i64, now: DateTime<Utc>) -> Self {
        let Some(at) = DateTime::<Utc>::from_timestamp(epoch_secs, 0) else {
            return ArrivalEta::Invalid;
        };
        let minutes = (at - now).num_seconds().div_euclid(60).max(0);
        if minutes == 0 {
            ArrivalEta::Now
        } else {
            ArrivalEta::Minutes(minutes)
        }
    }
}

impl fmt::Display for ArrivalEta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrivalEta::Now => f.write_str("Arriving now"),
            ArrivalEta::Minutes(m) => write!(f, "{} min", m),
            ArrivalEta::Invalid => f.write_str("..."),
        }
    }
}

impl Station {
    /// Countdown for every listed arrival, in the order the backend sent them.
    pub fn arrival_etas(&self, now: DateTime<Utc>) -> Vec<ArrivalEta> {
        self.next_arrival
            .iter()
            .map(|&ts| ArrivalEta::until(ts, now))
            .collect()
    }

    /// Countdown to the earliest arrival (the one shown on list cards).
    pub fn soonest_eta(&self, now: DateTime<Utc>) -> Option<ArrivalEta> {
        self.next_arrival_min().map(|ts| ArrivalEta::until(ts, now))
    }
}
