//! Token bucket implementation.

use std::time::Duration;
use tokio::time::Instant;

/// A token bucket that refills one token per `interval`, up to `burst` tokens.
///
/// Credit is tracked as a duration rather than a fractional token count: one
/// token is worth exactly one `interval` of accrued time. This keeps refill
/// arithmetic exact, so a request arriving precisely one interval after the
/// last admitted one is always admitted.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Time needed to accrue a single token
    interval: Duration,
    /// Maximum number of tokens the bucket holds
    burst: u32,
    /// Upper bound on `credit` (`interval * burst`)
    capacity: Duration,
    /// Currently accrued credit
    credit: Duration,
    /// When credit was last brought up to date
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(interval: Duration, burst: u32, now: Instant) -> Self {
        let capacity = interval.checked_mul(burst).unwrap_or(Duration::MAX);
        Self {
            interval,
            burst,
            capacity,
            credit: capacity,
            last_refill: now,
        }
    }

    /// Try to consume one token at `now`.
    ///
    /// Returns `true` if a token was available. A failed attempt consumes
    /// nothing.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.credit >= self.interval {
            self.credit -= self.interval;
            true
        } else {
            false
        }
    }

    /// Number of whole tokens available at `now`, without consuming any.
    pub fn available(&self, now: Instant) -> u32 {
        let credit = self.credit_at(now);
        if self.interval.is_zero() {
            return self.burst;
        }
        (credit.as_nanos() / self.interval.as_nanos()) as u32
    }

    /// Fractional token count as of the last refill.
    pub fn tokens(&self) -> f64 {
        if self.interval.is_zero() {
            return self.burst as f64;
        }
        self.credit.as_secs_f64() / self.interval.as_secs_f64()
    }

    /// Time remaining at `now` until the next token becomes available.
    pub fn time_until_available(&self, now: Instant) -> Duration {
        self.interval.saturating_sub(self.credit_at(now))
    }

    fn credit_at(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.credit.saturating_add(elapsed).min(self.capacity)
    }

    fn refill(&mut self, now: Instant) {
        self.credit = self.credit_at(now);
        // Never move the refill point backwards.
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn test_new_bucket_is_full() {
        let now = Instant::now();
        let bucket = TokenBucket::new(INTERVAL, 3, now);

        assert_eq!(bucket.available(now), 3);
        assert_eq!(bucket.tokens(), 3.0);
        assert_eq!(bucket.time_until_available(now), Duration::ZERO);
    }

    #[test]
    fn test_single_token_gate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(INTERVAL, 1, start);

        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start));
        assert_eq!(bucket.time_until_available(start), INTERVAL);

        // Half an interval is not enough
        assert!(!bucket.try_acquire(start + INTERVAL / 2));
        assert_eq!(bucket.time_until_available(start + INTERVAL / 2), INTERVAL / 2);

        // Exactly one full interval after the admitted request is
        assert!(bucket.try_acquire(start + INTERVAL));
    }

    #[test]
    fn test_denied_attempts_do_not_consume() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(INTERVAL, 1, start);

        assert!(bucket.try_acquire(start));
        for step in 1..10 {
            assert!(!bucket.try_acquire(start + INTERVAL / 10 * step));
        }
        assert!(bucket.try_acquire(start + INTERVAL));
    }

    #[test]
    fn test_credit_is_capped_at_burst() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(INTERVAL, 2, start);

        assert!(bucket.try_acquire(start));
        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start));

        // A long idle period only restores `burst` tokens
        let later = start + INTERVAL * 50;
        assert_eq!(bucket.available(later), 2);
        assert!(bucket.try_acquire(later));
        assert!(bucket.try_acquire(later));
        assert!(!bucket.try_acquire(later));
    }

    #[test]
    fn test_earlier_instant_does_not_rewind() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(INTERVAL, 1, start + INTERVAL);

        assert!(bucket.try_acquire(start + INTERVAL));
        // An out-of-order observation neither refills nor panics
        assert!(!bucket.try_acquire(start));
        assert!(bucket.try_acquire(start + INTERVAL * 2));
    }
}
