//! # Wall-clock alignment arithmetic.
//!
//! Pure functions: no wall-clock reads, no allocation. `now` is a parameter
//! so every case is testable deterministically.

/// Requested wall-clock alignment for a schedule's fire times.
///
/// When multiple flags are set, the coarsest unit wins (day > hour > minute).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Alignment {
    /// Fire times land on minute boundaries.
    pub to_minute: bool,
    /// Fire times land on hour boundaries.
    pub to_hour: bool,
    /// Fire times land on day boundaries (UTC).
    pub to_day: bool,
}

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 3_600_000;
const DAY_MS: u64 = 86_400_000;

impl Alignment {
    /// No alignment requested.
    pub fn none() -> Self {
        Self::default()
    }

    /// True when no flag is set.
    pub fn is_none(&self) -> bool {
        !(self.to_minute || self.to_hour || self.to_day)
    }

    /// The boundary unit in milliseconds, coarsest flag first.
    fn unit_ms(&self) -> Option<u64> {
        if self.to_day {
            Some(DAY_MS)
        } else if self.to_hour {
            Some(HOUR_MS)
        } else if self.to_minute {
            Some(MINUTE_MS)
        } else {
            None
        }
    }
}

/// Computes the next fire time for an aligned schedule.
///
/// Rounds `base_ms` up to the next requested boundary, then advances in
/// `interval_ms` increments until the result is strictly greater than
/// `now_ms`. Without alignment the result is simply `base_ms + interval_ms`
/// advanced past `now_ms`.
///
/// `interval_ms == 0` is treated as 1ms so the loop always terminates.
pub fn next_aligned_time(interval_ms: u64, base_ms: u64, alignment: Alignment, now_ms: u64) -> u64 {
    let interval_ms = interval_ms.max(1);

    let mut t = match alignment.unit_ms() {
        // Ceil to the boundary; a base already on one stays put.
        Some(unit) => base_ms.div_ceil(unit) * unit,
        None => base_ms.saturating_add(interval_ms),
    };

    while t <= now_ms {
        t = t.saturating_add(interval_ms);
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Alignment = Alignment {
        to_minute: true,
        to_hour: false,
        to_day: false,
    };
    const HOUR: Alignment = Alignment {
        to_minute: false,
        to_hour: true,
        to_day: false,
    };
    const DAY: Alignment = Alignment {
        to_minute: false,
        to_hour: false,
        to_day: true,
    };

    #[test]
    fn minute_alignment_lands_on_boundary() {
        // base 12:00:37.500, now just after base
        let base = 100 * MINUTE_MS + 37_500;
        let now = base + 1_000;
        let t = next_aligned_time(60_000, base, MINUTE, now);
        assert_eq!(t % MINUTE_MS, 0);
        assert!(t > now);
        assert_eq!(t, 101 * MINUTE_MS);
    }

    #[test]
    fn aligned_base_on_boundary_stays_aligned() {
        let base = 100 * MINUTE_MS;
        let now = base; // result must be strictly greater
        let t = next_aligned_time(60_000, base, MINUTE, now);
        assert_eq!(t, 101 * MINUTE_MS);
    }

    #[test]
    fn advances_past_now_in_interval_steps() {
        let base = 10 * MINUTE_MS;
        let now = base + 5 * MINUTE_MS + 1;
        let t = next_aligned_time(2 * MINUTE_MS, base, MINUTE, now);
        assert!(t > now);
        assert_eq!((t - base) % (2 * MINUTE_MS), 0);
    }

    #[test]
    fn hour_and_day_alignment() {
        let base = 3 * HOUR_MS + 17;
        let t = next_aligned_time(HOUR_MS, base, HOUR, base);
        assert_eq!(t % HOUR_MS, 0);
        assert!(t > base);

        let base = 2 * DAY_MS + 12 * HOUR_MS;
        let t = next_aligned_time(DAY_MS, base, DAY, base);
        assert_eq!(t, 3 * DAY_MS);
    }

    #[test]
    fn coarsest_flag_wins() {
        let both = Alignment {
            to_minute: true,
            to_hour: true,
            to_day: false,
        };
        let base = HOUR_MS + 30 * MINUTE_MS;
        let t = next_aligned_time(HOUR_MS, base, both, base);
        assert_eq!(t % HOUR_MS, 0);
    }

    #[test]
    fn no_alignment_is_plain_interval_arithmetic() {
        let t = next_aligned_time(60_000, 1_000, Alignment::none(), 500);
        assert_eq!(t, 61_000);
    }

    #[test]
    fn stale_base_is_advanced_not_returned() {
        // base far in the past; result must still exceed now
        let now = 500 * MINUTE_MS + 42;
        let t = next_aligned_time(60_000, 0, MINUTE, now);
        assert!(t > now);
        assert_eq!(t % MINUTE_MS, 0);
    }

    #[test]
    fn zero_interval_terminates() {
        let t = next_aligned_time(0, 0, Alignment::none(), 10);
        assert!(t > 10);
    }
}
