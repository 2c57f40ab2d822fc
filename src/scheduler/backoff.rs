//! Exponential backoff with full jitter (§4.3: base 1s, factor 2, cap
//! 60s). Pulled out as a pure function so the schedule itself can be
//! tested without spinning up a scheduler.

use std::time::Duration;

/// `attempt` is 1-indexed: the delay before the *next* try after
/// `attempt` has already failed.
pub fn next_delay(attempt: u32, base_ms: u64, factor: f64, cap_ms: u64, rng: &mut impl rand::Rng) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let exp_ms = base_ms as f64 * factor.powi(exponent);
    let capped = exp_ms.min(cap_ms as f64).max(base_ms as f64);
    let jittered = rng.gen_range(0.0..=capped);
    Duration::from_millis(jittered as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_exceeds_base() {
        let mut rng = rand::thread_rng();
        let delay = next_delay(1, 1_000, 2.0, 60_000, &mut rng);
        assert!(delay <= Duration::from_millis(1_000));
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let mut rng = rand::thread_rng();
        for attempt in 1..20 {
            let delay = next_delay(attempt, 1_000, 2.0, 60_000, &mut rng);
            assert!(delay <= Duration::from_millis(60_000));
        }
    }

    #[test]
    fn later_attempts_have_higher_ceiling() {
        let mut rng = rand::thread_rng();
        let mut max_of = |attempt: u32| {
            (0..50)
                .map(|_| next_delay(attempt, 1_000, 2.0, 60_000, &mut rng))
                .max()
                .unwrap()
        };
        assert!(max_of(4) >= max_of(1));
    }
}
