//! Reconnection backoff policy
//!
//! Answers one question: how long to wait before the next connection
//! attempt. Retry orchestration (attempt caps, abort conditions) stays
//! with the caller so the session core never owns unbounded retry loops.

use std::time::Duration;

/// Doubling backoff between a floor and a ceiling
#[derive(Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl ExponentialBackoff {
    pub const DEFAULT_FLOOR: Duration = Duration::from_secs(1);
    pub const DEFAULT_CEILING: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self::with_bounds(Self::DEFAULT_FLOOR, Self::DEFAULT_CEILING)
    }

    pub fn with_bounds(floor: Duration, ceiling: Duration) -> Self {
        Self {
            current: floor,
            floor,
            ceiling,
        }
    }

    /// The delay to wait before the next attempt. Each call doubles the
    /// following delay, up to the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.ceiling);
        delay
    }

    /// Restore the floor delay after a successful connect
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_up_to_the_ceiling() {
        let mut backoff = ExponentialBackoff::new();
        let secs: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_sequence_is_non_decreasing() {
        let mut backoff = ExponentialBackoff::new();
        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= ExponentialBackoff::DEFAULT_CEILING);
            previous = delay;
        }
    }

    #[test]
    fn test_reset_restores_the_floor_exactly() {
        let mut backoff = ExponentialBackoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), ExponentialBackoff::DEFAULT_FLOOR);
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff =
            ExponentialBackoff::with_bounds(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
    }
}
