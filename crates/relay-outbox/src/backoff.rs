use rand::Rng;
use std::time::Duration;

/// `min(base * 2^(attempt-1), max)` with up to ±30% jitter, matching the
/// teacher's `calculate_backoff` shape generalized from a fixed per-second
/// table to a configurable base/ceiling pair.
pub fn exponential_with_jitter(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let scaled_ms = (base.as_millis() as f64) * 2f64.powi(exponent as i32);

    let mut rng = rand::thread_rng();
    let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3);
    let jittered_ms = (scaled_ms * jitter_factor).max(0.0);
    let capped_ms = jittered_ms.min(max.as_millis() as f64);
    Duration::from_millis(capped_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_the_configured_ceiling() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        for attempt in 1..20 {
            let delay = exponential_with_jitter(base, max, attempt);
            assert!(delay <= max + Duration::from_millis(1));
        }
    }

    #[test]
    fn grows_with_attempt_number_before_the_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(60);
        // jitter is at most +/-30%, so attempt 3's floor still clears attempt 1's ceiling
        let first = exponential_with_jitter(base, max, 1);
        let third = exponential_with_jitter(base, max, 3);
        assert!(third.as_millis() as f64 >= first.as_millis() as f64 * 0.5);
    }
}
