//! Exponential reconnect backoff with random jitter.

use std::time::Duration;

/// Reconnect delay schedule.
///
/// Each failed attempt doubles the base delay up to `max`; a successful
/// connection resets it to `initial`. A random jitter in `[0, jitter]` is
/// added on top of every delay so clients dropped together do not reconnect
/// in lockstep.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: Duration,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a schedule starting at `initial`.
    pub fn new(initial: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter,
            current: initial,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        base.saturating_add(self.sample_jitter())
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    /// Attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random::<u64>() % max_ms.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = Backoff::new(ms(100), ms(500), Duration::ZERO);
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![ms(100), ms(200), ms(400), ms(500), ms(500)]);
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new(ms(100), ms(1_000), Duration::ZERO);
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), ms(100));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let mut backoff = Backoff::new(ms(100), ms(100), ms(50));
        for _ in 0..200 {
            let delay = backoff.next_delay();
            assert!(delay >= ms(100) && delay <= ms(150), "{delay:?}");
        }
    }

    #[test]
    fn unbounded_jitter_does_not_overflow() {
        let mut backoff = Backoff::new(ms(10), ms(10), Duration::MAX);
        for _ in 0..50 {
            assert!(backoff.next_delay() >= ms(10));
        }
    }

    #[test]
    fn max_below_initial_is_raised() {
        let mut backoff = Backoff::new(ms(300), ms(10), Duration::ZERO);
        assert_eq!(backoff.next_delay(), ms(300));
        assert_eq!(backoff.next_delay(), ms(300));
    }
}
