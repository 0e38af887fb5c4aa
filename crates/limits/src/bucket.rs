//! Continuous-refill token buckets.
//!
//! Each service owns a [`ServiceLimiter`] holding two buckets: one for
//! throughput tokens (TPM) and one for request count (RPM). Both refill by
//! `limit / 60` per second of elapsed time, capped at the limit, and are
//! checked together so that many tiny calls are still throttled by RPM.

use std::time::Duration;

use tokio::time::Instant;

/// Tolerance for float drift when comparing refilled levels against whole
/// amounts (e.g. 0.9999999 requests after exactly one refill period).
const EPSILON: f64 = 1e-9;

/// A single bucket. Fill level is always within `[0, capacity]`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    available: f64,
}

impl TokenBucket {
    /// A full bucket that refills `limit` units per minute.
    pub fn per_minute(limit: u64) -> Self {
        let capacity = limit as f64;
        Self {
            capacity,
            rate_per_sec: capacity / 60.0,
            available: capacity,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    /// Fill level after `elapsed` more time, without mutating.
    fn projected(&self, elapsed: Duration) -> f64 {
        (self.available + elapsed.as_secs_f64() * self.rate_per_sec).min(self.capacity)
    }

    fn refill(&mut self, elapsed: Duration) {
        self.available = self.projected(elapsed);
    }

    fn covers(&self, amount: f64) -> bool {
        self.available + EPSILON >= amount
    }

    fn take(&mut self, amount: f64) {
        self.available = (self.available - amount).max(0.0);
    }

    fn deficit(&self, amount: f64) -> f64 {
        (amount - self.available).max(0.0)
    }

    fn time_to_cover(&self, amount: f64) -> Duration {
        let deficit = self.deficit(amount);
        if deficit <= EPSILON {
            return Duration::ZERO;
        }
        if self.rate_per_sec <= 0.0 {
            return Duration::MAX;
        }
        // Saturates for deficits no refill horizon can reach.
        Duration::try_from_secs_f64(deficit / self.rate_per_sec).unwrap_or(Duration::MAX)
    }
}

/// Result of [`ServiceLimiter::try_consume`].
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Consume {
    Admitted,
    Insufficient(Shortfall),
}

impl Consume {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// How far a request is from being admissible.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    /// Missing throughput tokens (0 if the TPM bucket was sufficient).
    pub tokens: f64,
    /// Missing requests (0 if the RPM bucket was sufficient).
    pub requests: f64,
    /// Time until both buckets would cover the request, assuming nothing
    /// else consumes in the meantime.
    pub retry_after: Duration,
}

/// Point-in-time fill levels of a service's buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterLevels {
    pub tpm_available: f64,
    pub tpm_limit: f64,
    pub rpm_available: f64,
    pub rpm_limit: f64,
}

/// The pair of buckets guarding one service.
#[derive(Debug, Clone)]
pub struct ServiceLimiter {
    tokens: TokenBucket,
    requests: TokenBucket,
    last_refill: Instant,
}

impl ServiceLimiter {
    pub fn new(tpm_limit: u64, rpm_limit: u64, now: Instant) -> Self {
        Self {
            tokens: TokenBucket::per_minute(tpm_limit),
            requests: TokenBucket::per_minute(rpm_limit),
            last_refill: now,
        }
    }

    /// Credit both buckets for the time elapsed since the last refill.
    ///
    /// A `now` earlier than the last refill credits nothing.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens.refill(elapsed);
        self.requests.refill(elapsed);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Refill, then take `tokens` and `requests` from both buckets, or
    /// nothing at all.
    pub fn try_consume(&mut self, now: Instant, tokens: u64, requests: u64) -> Consume {
        self.refill(now);
        let (t, r) = (tokens as f64, requests as f64);

        if self.tokens.covers(t) && self.requests.covers(r) {
            self.tokens.take(t);
            self.requests.take(r);
            return Consume::Admitted;
        }

        Consume::Insufficient(Shortfall {
            tokens: self.tokens.deficit(t),
            requests: self.requests.deficit(r),
            retry_after: self.tokens.time_to_cover(t).max(self.requests.time_to_cover(r)),
        })
    }

    /// Whether a request of this size could ever be admitted, i.e. it fits
    /// within both bucket capacities.
    pub fn can_fit(&self, tokens: u64, requests: u64) -> bool {
        tokens as f64 <= self.tokens.capacity() && requests as f64 <= self.requests.capacity()
    }

    /// Fill levels as of `now`, without mutating the buckets.
    pub fn levels(&self, now: Instant) -> LimiterLevels {
        let elapsed = now.saturating_duration_since(self.last_refill);
        LimiterLevels {
            tpm_available: self.tokens.projected(elapsed),
            tpm_limit: self.tokens.capacity(),
            rpm_available: self.requests.projected(elapsed),
            rpm_limit: self.requests.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn starts_full() {
        let now = Instant::now();
        let limiter = ServiceLimiter::new(1000, 60, now);
        let levels = limiter.levels(now);
        assert_eq!(levels.tpm_available, 1000.0);
        assert_eq!(levels.rpm_available, 60.0);
    }

    #[test]
    fn consumes_from_both_buckets() {
        let now = Instant::now();
        let mut limiter = ServiceLimiter::new(1000, 60, now);
        assert!(limiter.try_consume(now, 400, 1).is_admitted());
        let levels = limiter.levels(now);
        assert_eq!(levels.tpm_available, 600.0);
        assert_eq!(levels.rpm_available, 59.0);
    }

    #[test]
    fn failure_deducts_nothing() {
        let now = Instant::now();
        let mut limiter = ServiceLimiter::new(1000, 1, now);
        assert!(limiter.try_consume(now, 10, 1).is_admitted());

        // Plenty of tokens left, but the request bucket is empty.
        let result = limiter.try_consume(now, 10, 1);
        let Consume::Insufficient(shortfall) = result else {
            panic!("expected shortfall");
        };
        assert_eq!(shortfall.tokens, 0.0);
        assert_eq!(shortfall.requests, 1.0);
        assert_eq!(limiter.levels(now).tpm_available, 990.0);
    }

    #[test]
    fn refill_is_continuous_and_capped() {
        let t0 = Instant::now();
        let mut limiter = ServiceLimiter::new(600, 60, t0);
        assert!(limiter.try_consume(t0, 600, 60).is_admitted());

        // 600 tpm = 10 tokens/s; 60 rpm = 1 request/s.
        let levels = limiter.levels(t0 + secs(2.5));
        assert!((levels.tpm_available - 25.0).abs() < 1e-6);
        assert!((levels.rpm_available - 2.5).abs() < 1e-6);

        let levels = limiter.levels(t0 + secs(3600.0));
        assert_eq!(levels.tpm_available, 600.0);
        assert_eq!(levels.rpm_available, 60.0);
    }

    #[test]
    fn retry_after_covers_slowest_bucket() {
        let t0 = Instant::now();
        let mut limiter = ServiceLimiter::new(1000, 2, t0);
        assert!(limiter.try_consume(t0, 400, 1).is_admitted());
        assert!(limiter.try_consume(t0, 400, 1).is_admitted());

        let Consume::Insufficient(shortfall) = limiter.try_consume(t0, 300, 1) else {
            panic!("expected shortfall");
        };
        // Tokens: 200 available, 300 needed → 100 short at 16.67/s = 6s.
        // Requests: 1 short at 1/30 per second = 30s.
        assert!((shortfall.tokens - 100.0).abs() < 1e-9);
        assert!((shortfall.retry_after.as_secs_f64() - 30.0).abs() < 1e-6);

        assert!(limiter.try_consume(t0 + secs(30.0), 300, 1).is_admitted());
    }

    #[test]
    fn backwards_time_credits_nothing() {
        let t0 = Instant::now();
        let later = t0 + secs(10.0);
        let mut limiter = ServiceLimiter::new(60, 60, later);
        assert!(limiter.try_consume(later, 60, 1).is_admitted());
        limiter.refill(t0);
        assert_eq!(limiter.levels(later).tpm_available, 0.0);
    }

    #[test]
    fn oversized_requests_never_fit() {
        let limiter = ServiceLimiter::new(1000, 10, Instant::now());
        assert!(limiter.can_fit(1000, 1));
        assert!(!limiter.can_fit(1001, 1));
    }

    #[test]
    fn fill_stays_within_bounds_for_any_sequence() {
        let t0 = Instant::now();
        let mut limiter = ServiceLimiter::new(5000, 30, t0);
        let mut now = t0;
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for _ in 0..10_000 {
            now += Duration::from_millis(next() % 3000);
            let _ = limiter.try_consume(now, next() % 2500, 1 + next() % 3);
            let levels = limiter.levels(now);
            assert!(levels.tpm_available >= 0.0 && levels.tpm_available <= levels.tpm_limit);
            assert!(levels.rpm_available >= 0.0 && levels.rpm_available <= levels.rpm_limit);
        }
    }

    #[test]
    fn oversized_request_saturates_retry_after() {
        let now = Instant::now();
        let mut limiter = ServiceLimiter::new(1, 1, now);
        match limiter.try_consume(now, u64::MAX, 1) {
            Consume::Insufficient(shortfall) => {
                assert_eq!(shortfall.retry_after, Duration::MAX);
                assert_eq!(shortfall.requests, 0.0);
            }
            Consume::Admitted => panic!("u64::MAX tokens admitted"),
        }
        assert_eq!(limiter.levels(now).tpm_available, 1.0);
    }
}
