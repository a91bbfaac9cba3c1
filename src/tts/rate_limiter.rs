//! Per-minute admission control for backend requests
//!
//! Requests are counted in calendar-minute buckets. A caller that would push
//! the current bucket past the limit is queued until the next minute
//! boundary rather than rejected.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RateLimitConfig;

const MINUTE_MS: i64 = 60_000;

/// Buckets older than this are dropped by [`RateLimiter::sweep`]
const RETENTION_MS: i64 = 2 * MINUTE_MS;

/// Sliding one-minute-bucket rate limiter
pub struct RateLimiter {
    enabled: bool,
    requests_per_minute: u32,
    clock: Arc<dyn Clock>,
    /// Minute start (ms since epoch) to admitted request count
    window: Mutex<BTreeMap<i64, u32>>,
    /// Fair queue for callers waiting on a full bucket
    admission: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled: config.enabled,
            requests_per_minute: config.requests_per_minute,
            clock,
            window: Mutex::new(BTreeMap::new()),
            admission: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn current_minute(&self) -> (i64, i64) {
        let now = self.clock.now_millis();
        (now - now.rem_euclid(MINUTE_MS), now)
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, u32>> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a request could be admitted right now
    #[must_use]
    pub fn can_proceed(&self) -> bool {
        if !self.enabled {
            return true;
        }
        let (minute, _) = self.current_minute();
        let count = self.lock_window().get(&minute).copied().unwrap_or(0);
        count < self.requests_per_minute
    }

    /// Time until the next request would be admitted; zero when not blocked
    #[must_use]
    pub fn time_until_next(&self) -> Duration {
        if self.can_proceed() {
            return Duration::ZERO;
        }
        let (minute, now) = self.current_minute();
        millis(minute + MINUTE_MS - now)
    }

    /// Count a request, waiting for the next minute boundary if the current
    /// bucket is full
    ///
    /// Waiting callers are admitted in arrival order.
    pub async fn record_and_wait(&self) {
        if !self.enabled {
            return;
        }

        let _turn = self.admission.lock().await;
        loop {
            let wait = {
                let (minute, now) = self.current_minute();
                let mut window = self.lock_window();
                let count = window.entry(minute).or_insert(0);
                if *count < self.requests_per_minute {
                    *count += 1;
                    tracing::trace!(minute, count = *count, "request admitted");
                    return;
                }
                millis(minute + MINUTE_MS - now)
            };

            tracing::info!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                limit = self.requests_per_minute,
                "rate limit reached, waiting for next minute"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Drop buckets older than two minutes
    pub fn sweep(&self) {
        let (_, now) = self.current_minute();
        let cutoff = now - RETENTION_MS;
        let mut window = self.lock_window();
        let before = window.len();
        window.retain(|minute, _| *minute >= cutoff);
        let dropped = before - window.len();
        if dropped > 0 {
            tracing::debug!(dropped, "swept stale rate buckets");
        }
    }

    /// Forget every bucket
    pub fn reset(&self) {
        self.lock_window().clear();
    }

    /// Requests counted in the current minute
    #[must_use]
    pub fn current_count(&self) -> u32 {
        let (minute, _) = self.current_minute();
        self.lock_window().get(&minute).copied().unwrap_or(0)
    }

    /// Number of buckets currently held
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.lock_window().len()
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms.max(0)).unwrap_or(0))
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;

    fn limiter(rpm: u32, clock: &Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                enabled: true,
                requests_per_minute: rpm,
            },
            clock.clone(),
        )
    }

    fn clock_at_second(second: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, second).unwrap(),
        ))
    }

    #[tokio::test]
    async fn blocks_after_limit() {
        let clock = clock_at_second(15);
        let limiter = limiter(2, &clock);

        assert!(limiter.can_proceed());
        assert_eq!(limiter.time_until_next(), Duration::ZERO);

        limiter.record_and_wait().await;
        limiter.record_and_wait().await;

        assert!(!limiter.can_proceed());
        assert_eq!(limiter.time_until_next(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn new_minute_reopens() {
        let clock = clock_at_second(50);
        let limiter = limiter(1, &clock);

        limiter.record_and_wait().await;
        assert!(!limiter.can_proceed());

        clock.advance(chrono::Duration::seconds(10));
        assert!(limiter.can_proceed());
        assert_eq!(limiter.current_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_bucket_waits_for_boundary() {
        let clock = clock_at_second(30);
        let limiter = Arc::new(limiter(1, &clock));
        limiter.record_and_wait().await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.record_and_wait().await })
        };

        // Let the waiter observe the full bucket and go to sleep
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // Wall clock crosses the boundary while tokio time catches up
        clock.advance(chrono::Duration::seconds(30));
        tokio::time::advance(Duration::from_secs(30)).await;
        waiter.await.unwrap();

        assert_eq!(limiter.current_count(), 1);
    }

    #[test]
    fn disabled_limiter_is_trivial() {
        let clock = clock_at_second(0);
        let limiter = RateLimiter::new(
            RateLimitConfig {
                enabled: false,
                requests_per_minute: 1,
            },
            clock,
        );
        assert!(limiter.can_proceed());
        assert_eq!(limiter.time_until_next(), Duration::ZERO);
    }

    #[tokio::test]
    async fn sweep_drops_old_buckets() {
        let clock = clock_at_second(0);
        let limiter = limiter(10, &clock);

        limiter.record_and_wait().await;
        clock.advance(chrono::Duration::minutes(1));
        limiter.record_and_wait().await;
        assert_eq!(limiter.bucket_count(), 2);

        clock.advance(chrono::Duration::minutes(2));
        limiter.sweep();
        assert_eq!(limiter.bucket_count(), 1);

        clock.advance(chrono::Duration::minutes(1));
        limiter.sweep();
        assert_eq!(limiter.bucket_count(), 0);
    }
}
