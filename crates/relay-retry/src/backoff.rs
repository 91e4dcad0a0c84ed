use std::time::Duration;

/// Step for a 1-indexed delivery attempt, holding at the final configured
/// step once attempts exceed the schedule's length. An empty schedule
/// yields zero delay, which the caller treats as ack-immediately-retry.
pub fn backoff_for_attempt(schedule: &[Duration], attempt_number: u64) -> Duration {
    if schedule.is_empty() {
        return Duration::from_millis(0);
    }
    let index = (attempt_number.saturating_sub(1)) as usize;
    schedule[index.min(schedule.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_configured_schedule() {
        let schedule = vec![Duration::from_millis(100), Duration::from_millis(500), Duration::from_millis(1_000)];
        assert_eq!(backoff_for_attempt(&schedule, 1), Duration::from_millis(100));
        assert_eq!(backoff_for_attempt(&schedule, 2), Duration::from_millis(500));
        assert_eq!(backoff_for_attempt(&schedule, 3), Duration::from_millis(1_000));
    }

    #[test]
    fn holds_at_final_step_past_schedule_length() {
        let schedule = vec![Duration::from_millis(100), Duration::from_millis(500)];
        assert_eq!(backoff_for_attempt(&schedule, 7), Duration::from_millis(500));
    }

    #[test]
    fn empty_schedule_is_zero_delay() {
        assert_eq!(backoff_for_attempt(&[], 3), Duration::from_millis(0));
    }
}
