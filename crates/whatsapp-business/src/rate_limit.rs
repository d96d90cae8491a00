//! Outbound token bucket.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

#[cfg(feature = "metrics")]
use wabridge_metrics::{counter, histogram, rate_limiter as rl_metrics};

use wabridge_config::RateLimitConfig;

const MIN_REFILL_PER_SECOND: f64 = 0.001;
/// Absorbs float drift so a wait of exactly one refill interval succeeds.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Fixed-capacity bucket refilled continuously at `refill_per_second`.
///
/// Starts full. Refill and consume happen under one lock, so concurrent
/// callers never both take the last token.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Capacity is clamped to at least 1 and the refill rate to a small
    /// positive minimum.
    #[must_use]
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_per_second = if refill_per_second.is_finite() {
            refill_per_second.max(MIN_REFILL_PER_SECOND)
        } else {
            MIN_REFILL_PER_SECOND
        };
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_second)
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        // Built from a u32, so the cast is lossless.
        self.capacity as u32
    }

    /// Take one token, waiting up to `timeout` for it.
    ///
    /// Returns `false` as soon as the wait for the next token would run past
    /// the deadline. The lock is released while sleeping.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens + EPSILON >= 1.0 {
                    state.tokens = (state.tokens - 1.0).max(0.0);
                    #[cfg(feature = "metrics")]
                    {
                        counter!(rl_metrics::ACQUIRED_TOTAL).increment(1);
                        histogram!(rl_metrics::WAIT_SECONDS)
                            .record(started.elapsed().as_secs_f64());
                    }
                    return true;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_second)
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if wait > remaining {
                #[cfg(feature = "metrics")]
                counter!(rl_metrics::DENIED_TOTAL).increment(1);
                return false;
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token only if it is available right now.
    pub async fn try_acquire(&self) -> bool {
        self.acquire(Duration::ZERO).await
    }

    /// Tokens currently in the bucket, after refill.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_second)
            .min(self.capacity);
        state.last_refill = now;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    #[tokio::test(start_paused = true)]
    async fn denies_when_exhausted_until_refill() {
        let limiter = RateLimiter::new(2, 1.0);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill_within_timeout() {
        let limiter = RateLimiter::new(1, 2.0);
        assert!(limiter.try_acquire().await);

        let start = Instant::now();
        assert!(limiter.acquire(Duration::from_secs(1)).await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_gives_up_early_when_wait_exceeds_timeout() {
        let limiter = RateLimiter::new(1, 0.1);
        assert!(limiter.try_acquire().await);

        let start = Instant::now();
        assert!(!limiter.acquire(Duration::from_secs(2)).await);
        // Next token is 10s away: no point sleeping through the timeout.
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_rate() {
        let limiter = Arc::new(RateLimiter::new(1, 10.0));
        let start = Instant::now();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire(Duration::from_secs(5)).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        // One immediate token, then four refills at 100ms each.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn available_reports_refilled_tokens_capped_at_capacity() {
        let limiter = RateLimiter::new(3, 1.0);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!((limiter.available().await - 1.0).abs() < 1e-6);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available().await - 3.0).abs() < 1e-6);
    }

    #[test]
    fn clamps_invalid_settings() {
        let limiter = RateLimiter::new(0, -5.0);
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.refill_per_second >= MIN_REFILL_PER_SECOND);
    }
}
