//! Countdown derivation: pure functions of a deadline and "now".
//!
//! The connection loop samples these once per second while a round deadline
//! is set and emits [`CountdownTick`](crate::event::OfferPatrolEvent::CountdownTick)
//! events; nothing here holds state of its own.

use chrono::{DateTime, Utc};

/// Threshold at or below which a round counts as "ending soon". Advisory
/// only; carries no behavioral effect on game state.
pub const ENDING_SOON_SECS: i64 = 10;

/// Whole seconds until `deadline`, clamped at zero once it has passed.
pub fn remaining_seconds(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = deadline.signed_duration_since(now).num_milliseconds();
    (millis.max(0)) / 1000
}

/// Seconds component for display: `remaining mod 60`.
///
/// The reference presentation shows no minutes field; rounds are expected to
/// fit under a minute of displayed time near their end.
pub fn display_seconds(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    remaining_seconds(deadline, now) % 60
}

/// `true` when [`ENDING_SOON_SECS`] or fewer whole seconds remain.
pub fn is_ending_soon(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    remaining_seconds(deadline, now) <= ENDING_SOON_SECS
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    #[test]
    fn remaining_counts_whole_seconds() {
        assert_eq!(remaining_seconds(at(20), at(0)), 20);
        assert_eq!(remaining_seconds(at(90), at(0)), 90);
    }

    #[test]
    fn remaining_floors_partial_seconds() {
        let deadline = at(10) + chrono::Duration::milliseconds(900);
        assert_eq!(remaining_seconds(deadline, at(0)), 10);
    }

    #[test]
    fn remaining_clamps_at_zero_after_deadline() {
        assert_eq!(remaining_seconds(at(0), at(5)), 0);
    }

    #[test]
    fn remaining_is_monotonically_non_increasing() {
        let deadline = at(45);
        let mut previous = i64::MAX;
        for elapsed in 0..60 {
            let current = remaining_seconds(deadline, at(elapsed));
            assert!(current <= previous, "countdown increased at t={elapsed}");
            previous = current;
        }
    }

    #[test]
    fn display_wraps_at_sixty() {
        assert_eq!(display_seconds(at(90), at(0)), 30);
        assert_eq!(display_seconds(at(60), at(0)), 0);
        assert_eq!(display_seconds(at(59), at(0)), 59);
    }

    #[test]
    fn ending_soon_at_threshold() {
        assert!(is_ending_soon(at(10), at(0)));
        assert!(is_ending_soon(at(3), at(0)));
        assert!(!is_ending_soon(at(11), at(0)));
    }
}
