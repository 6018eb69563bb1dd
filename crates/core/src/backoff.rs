//! Exponential backoff with mandatory jitter (spec.md §4.1, §8 property 3).
//!
//! `delay = min(3600000, 60000 * 2^(attemptsMade-1)) * (1 + U(-0.2, 0.2))`.
//! Jitter is mandatory to avoid thundering herds on restart — this is
//! stated as an invariant in spec.md, not a tunable.

pub const BASE_MS: i64 = 60_000;
pub const CAP_MS: i64 = 3_600_000;
pub const JITTER: f64 = 0.2;

/// The un-jittered base delay for a given attempt count, exposed so tests
/// can assert the jittered value lands in `[0.8*base, 1.2*base]`.
pub fn base_delay_ms(attempts_made: u32) -> i64 {
    if attempts_made == 0 {
        return 0;
    }
    let exp = attempts_made.saturating_sub(1);
    // 2^exp can overflow i64 at large attempt counts; clamp to the cap first.
    let multiplier = if exp >= 6 { i64::MAX } else { 1i64 << exp };
    BASE_MS.saturating_mul(multiplier).min(CAP_MS)
}

/// The jittered retry delay to apply after `attempts_made` failures.
pub fn retry_delay_ms(attempts_made: u32) -> i64 {
    let base = base_delay_ms(attempts_made);
    if base == 0 {
        return 0;
    }
    let jitter = fastrand::f64() * (2.0 * JITTER) - JITTER; // U(-0.2, 0.2)
    ((base as f64) * (1.0 + jitter)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_doubles_and_caps() {
        assert_eq!(base_delay_ms(1), 60_000);
        assert_eq!(base_delay_ms(2), 120_000);
        assert_eq!(base_delay_ms(3), 240_000);
        // 2^10 * 60000 would be ~61.4M ms, must clamp to the 1h cap.
        assert_eq!(base_delay_ms(11), CAP_MS);
    }

    #[test]
    fn jitter_bounds_hold_over_many_samples() {
        for attempts in 1..=6 {
            let base = base_delay_ms(attempts) as f64;
            for _ in 0..500 {
                let delay = retry_delay_ms(attempts) as f64;
                assert!(delay >= base * 0.8 - 1.0, "delay {delay} below lower bound for attempt {attempts}");
                assert!(delay <= base * 1.2 + 1.0, "delay {delay} above upper bound for attempt {attempts}");
            }
        }
    }

    #[test]
    fn zero_attempts_has_no_delay() {
        assert_eq!(retry_delay_ms(0), 0);
    }
}
