//! Time-based capacity regeneration.
//!
//! Converts elapsed time into regenerated draw slots. The calculation is a
//! pure function of the stored state and `now`, so running it twice with the
//! same `now` changes nothing the second time.
//!
//! The sub-interval remainder is preserved: `last_calc` only advances by
//! whole intervals while the user is below capacity, so partial progress
//! toward the next slot is never lost.

use gacha_types::CapacityState;

/// What one regeneration pass did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegenReport {
    /// Slots added by this pass.
    pub gained: u32,
    /// Slots available afterwards.
    pub slot_remaining: u32,
    /// Seconds until the next slot (0 when full or instant-full).
    pub seconds_to_next: f64,
}

/// Bring `state` up to date with `now`.
///
/// - An interval of zero (or less) refills to `slot_max`.
/// - A user at or above `slot_max` is clamped to `slot_max` and the clock
///   restarts at `now`.
/// - Otherwise `floor((now - last_calc) / interval)` whole cycles elapse;
///   each adds one slot up to `slot_max` and advances `last_calc` by one
///   interval. Time running backwards counts as zero cycles.
pub fn regenerate(state: &mut CapacityState, now: f64) -> RegenReport {
    let before = state.slot_remaining;

    if state.regen_interval <= 0.0 || state.slot_remaining >= state.slot_max {
        state.slot_remaining = state.slot_max;
        state.last_calc = now;
    } else {
        let cycles = ((now - state.last_calc) / state.regen_interval)
            .floor()
            .max(0.0);
        let deficit = state.slot_max.saturating_sub(state.slot_remaining);
        // Bounded to [0, deficit], so the cast is exact.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let gained = cycles.min(f64::from(deficit)) as u32;

        state.slot_remaining = state.slot_remaining.saturating_add(gained).min(state.slot_max);
        state.last_calc += cycles * state.regen_interval;
    }

    RegenReport {
        gained: state.slot_remaining.saturating_sub(before),
        slot_remaining: state.slot_remaining,
        seconds_to_next: seconds_to_next(state, now),
    }
}

/// Seconds until the next slot regenerates.
///
/// Zero when the interval is zero or the user is already full.
pub fn seconds_to_next(state: &CapacityState, now: f64) -> f64 {
    if state.regen_interval <= 0.0 || state.is_full() {
        return 0.0;
    }
    (state.last_calc + state.regen_interval - now).max(0.0)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn state(slot_max: u32, slot_remaining: u32, last_calc: f64, regen_interval: f64) -> CapacityState {
        CapacityState {
            slot_max,
            slot_remaining,
            last_calc,
            regen_interval,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn two_intervals_restore_two_slots() {
        let mut cap = state(3, 0, 0.0, 3600.0);
        let report = regenerate(&mut cap, 7200.0);
        assert_eq!(report.gained, 2);
        assert_eq!(cap.slot_remaining, 2);
        assert!(close(cap.last_calc, 7200.0));
        assert!(close(report.seconds_to_next, 3600.0));
    }

    #[test]
    fn partial_interval_is_kept() {
        let mut cap = state(3, 0, 1000.0, 3600.0);
        let report = regenerate(&mut cap, 6000.0);
        assert_eq!(report.gained, 1);
        assert!(close(cap.last_calc, 4600.0));
        assert!(close(report.seconds_to_next, 2200.0));
    }

    #[test]
    fn same_now_is_idempotent() {
        let mut cap = state(5, 1, 0.0, 600.0);
        let first = regenerate(&mut cap, 1500.0);
        let snapshot = cap;
        let second = regenerate(&mut cap, 1500.0);
        assert_eq!(first.slot_remaining, 3);
        assert_eq!(second.gained, 0);
        assert_eq!(cap, snapshot);
    }

    #[test]
    fn zero_interval_is_always_full() {
        let mut cap = state(4, 0, 0.0, 0.0);
        let report = regenerate(&mut cap, 1.0);
        assert_eq!(report.gained, 4);
        assert_eq!(cap.slot_remaining, 4);
        assert!(close(cap.last_calc, 1.0));
        assert!(close(report.seconds_to_next, 0.0));
    }

    #[test]
    fn full_user_restarts_clock() {
        let mut cap = state(3, 3, 0.0, 60.0);
        let report = regenerate(&mut cap, 500.0);
        assert_eq!(report.gained, 0);
        assert!(close(cap.last_calc, 500.0));
    }

    #[test]
    fn above_max_is_clamped_down() {
        let mut cap = state(3, 7, 0.0, 60.0);
        let report = regenerate(&mut cap, 10.0);
        assert_eq!(cap.slot_remaining, 3);
        assert_eq!(report.gained, 0);
    }

    #[test]
    fn clock_going_backwards_gains_nothing() {
        let mut cap = state(3, 1, 1000.0, 60.0);
        let report = regenerate(&mut cap, 400.0);
        assert_eq!(report.gained, 0);
        assert!(close(cap.last_calc, 1000.0));
        assert!(close(report.seconds_to_next, 660.0));
    }

    #[test]
    fn matches_closed_form_for_random_inputs() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let slot_max: u32 = rng.random_range(1..20);
            let remaining: u32 = rng.random_range(0..slot_max);
            let interval = f64::from(rng.random_range(1_u32..5000));
            let last_calc = f64::from(rng.random_range(0_u32..100_000));
            let elapsed = f64::from(rng.random_range(0_u32..200_000));

            let mut cap = state(slot_max, remaining, last_calc, interval);
            regenerate(&mut cap, last_calc + elapsed);

            let cycles = (elapsed / interval).floor();
            let expected = f64::from(remaining) + cycles;
            assert!(close(f64::from(cap.slot_remaining), expected.min(f64::from(slot_max))));
            assert!(close(cap.last_calc, last_calc + cycles * interval));
        }
    }
}
