//! Attendance state resolution.
//!
//! Two states, checked in and checked out, derived from the latest event.
//! The edge into checked-out is debounced; the edge into checked-in is not.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{AttendanceEvent, EventKind};

pub const MINIMUM_CHECKOUT_MINUTES: i64 = 5;
/// Longest accepted debounce window: one day.
pub const MAX_CHECKOUT_MINUTES: i64 = 24 * 60;

/// What to do with a new attendance submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    CheckIn,
    CheckOut,
    /// Checked in too recently to check out.
    TooSoon { minutes_remaining: f64 },
}

impl Decision {
    /// Event kind to append, if the decision produces one.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            Decision::CheckIn => Some(EventKind::CheckIn),
            Decision::CheckOut => Some(EventKind::CheckOut),
            Decision::TooSoon { .. } => None,
        }
    }

    pub fn minutes_remaining(&self) -> Option<f64> {
        match self {
            Decision::TooSoon { minutes_remaining } => Some(*minutes_remaining),
            _ => None,
        }
    }
}

/// Resolves the next event kind from an identity's latest event.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    min_checkout: Duration,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(MINIMUM_CHECKOUT_MINUTES)
    }
}

impl Resolver {
    /// Window is clamped to `0..=MAX_CHECKOUT_MINUTES`.
    pub fn new(min_checkout_minutes: i64) -> Self {
        Self {
            min_checkout: Duration::minutes(min_checkout_minutes.clamp(0, MAX_CHECKOUT_MINUTES)),
        }
    }

    pub fn min_checkout(&self) -> Duration {
        self.min_checkout
    }

    pub fn resolve(&self, latest: Option<&AttendanceEvent>, now: DateTime<Utc>) -> Decision {
        let Some(latest) = latest else {
            return Decision::CheckIn;
        };

        match latest.kind {
            EventKind::CheckOut => Decision::CheckIn,
            EventKind::CheckIn => {
                // A clock running behind the stored event counts as no time elapsed.
                let elapsed = (now - latest.timestamp).max(Duration::zero());
                if elapsed < self.min_checkout {
                    Decision::TooSoon {
                        minutes_remaining: minutes(self.min_checkout - elapsed),
                    }
                } else {
                    Decision::CheckOut
                }
            }
        }
    }
}

/// Resolve with the default five-minute debounce window.
pub fn resolve(latest: Option<&AttendanceEvent>, now: DateTime<Utc>) -> Decision {
    Resolver::default().resolve(latest, now)
}

fn minutes(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 60_000.0
}
