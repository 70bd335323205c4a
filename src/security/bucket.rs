//! Token bucket with fractional refill.

use std::time::Duration;

use tokio::time::Instant;

/// Read-only view of a bucket at some instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketProbe {
    /// Tokens available, fractional.
    pub available: f64,
    /// Delay until one whole token is available. Zero when one already is.
    pub next_token_in: Duration,
    /// Delay until the bucket is back at capacity.
    pub full_in: Duration,
}

/// A token bucket that starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_update: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_update: now,
        }
    }

    fn available_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    /// Refill, then take one token if a whole one is available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.tokens = self.available_at(now);
        if now > self.last_update {
            self.last_update = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Inspect the bucket without consuming or refilling it.
    pub fn peek(&self, now: Instant) -> BucketProbe {
        let available = self.available_at(now);
        BucketProbe {
            available,
            next_token_in: self.time_to(available, 1.0),
            full_in: self.time_to(available, self.capacity),
        }
    }

    fn time_to(&self, available: f64, target: f64) -> Duration {
        let missing = target - available;
        if missing <= 0.0 || self.refill_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(missing / self.refill_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(3.0, 1.0, start);

        assert!(bucket.try_acquire(start));
        assert!(bucket.try_acquire(start));
        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start));

        // Half a token is not enough.
        assert!(!bucket.try_acquire(start + Duration::from_millis(500)));
        assert!(bucket.try_acquire(start + Duration::from_secs(1)));
        assert!(!bucket.try_acquire(start + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2.0, 10.0, start);
        assert!(bucket.try_acquire(start));

        let later = start + Duration::from_secs(3600);
        let probe = bucket.peek(later);
        assert_eq!(probe.available, 2.0);
        assert_eq!(probe.full_in, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_consume() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1.0, 0.5, start);
        for _ in 0..5 {
            assert_eq!(bucket.peek(start).available, 1.0);
        }
        assert!(bucket.try_acquire(start));

        let probe = bucket.peek(start);
        assert_eq!(probe.available, 0.0);
        assert_eq!(probe.next_token_in, Duration::from_secs(2));
        assert!(!bucket.try_acquire(start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_run_rate_converges() {
        // 10 per 60s, burst 10: over ten minutes at most 10 + 100 approvals.
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 10.0 / 60.0, start);
        let mut approved = 0;
        for ms in (0..600_000u64).step_by(100) {
            if bucket.try_acquire(start + Duration::from_millis(ms)) {
                approved += 1;
            }
        }
        assert!((105..=110).contains(&approved), "approved {approved}");
    }
}
