//! Fixed-window rate limiting for webhook and mutation route classes.
//!
//! Responsibility:
//! - Per-key counters with fixed window boundaries (a throttle, not an audit
//!   trail; nothing survives a restart)
//! - `reset_at_ms` is always `window_start + window_ms` so callers can derive
//!   a correct `retry-after`, regardless of how many calls landed after the
//!   limit was hit
//! - Bounded key cardinality: expired buckets are evicted first, then the
//!   oldest window
//!
//! Increments on the same key are serialized through one mutex over the
//! bucket map. Expected key cardinality is small (courses x route classes),
//! and no I/O ever happens while the lock is held.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Fixed boundary of the current window (epoch millis).
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Seconds a client should wait before retrying, rounded up.
    pub fn retry_after_secs(&self, now_ms: i64) -> i64 {
        ((self.reset_at_ms - now_ms).max(0) + 999) / 1000
    }
}

#[derive(Debug)]
struct Bucket {
    window_start_ms: i64,
    count: u32,
}

/// In-process fixed-window limiter.
///
/// Explicitly constructed and injected (no hidden singleton) so tests can
/// run against isolated instances.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    max_tracked_keys: usize,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACKED_KEYS)
    }

    pub fn with_capacity(max_tracked_keys: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_tracked_keys: max_tracked_keys.max(1),
        }
    }

    pub fn check(&self, key: &str, limit: u32, window_ms: u64) -> RateLimitDecision {
        self.check_at(key, limit, window_ms, Utc::now().timestamp_millis())
    }

    /// Clock-parameterized variant of [`check`](Self::check); the production
    /// path always passes the current wall clock.
    pub fn check_at(
        &self,
        key: &str,
        limit: u32,
        window_ms: u64,
        now_ms: i64,
    ) -> RateLimitDecision {
        let window_ms = window_ms.max(1) as i64;
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");

        let expired = match buckets.get(key) {
            Some(bucket) => now_ms >= bucket.window_start_ms + window_ms,
            None => true,
        };

        if expired {
            if !buckets.contains_key(key) && buckets.len() >= self.max_tracked_keys {
                Self::evict(&mut buckets, self.max_tracked_keys, window_ms, now_ms);
            }
            buckets.insert(
                key.to_string(),
                Bucket {
                    window_start_ms: now_ms,
                    count: 1,
                },
            );
            return RateLimitDecision {
                allowed: true,
                remaining: limit.saturating_sub(1),
                reset_at_ms: now_ms + window_ms,
            };
        }

        let bucket = buckets.get_mut(key).expect("bucket exists in this branch");
        bucket.count = bucket.count.saturating_add(1);

        RateLimitDecision {
            allowed: bucket.count <= limit,
            remaining: limit.saturating_sub(bucket.count),
            reset_at_ms: bucket.window_start_ms + window_ms,
        }
    }

    fn evict(buckets: &mut HashMap<String, Bucket>, max: usize, window_ms: i64, now_ms: i64) {
        buckets.retain(|_, b| now_ms < b.window_start_ms + window_ms);
        // Still at capacity after dropping expired windows: drop the oldest
        // live window rather than growing without bound.
        if buckets.len() >= max {
            if let Some(oldest) = buckets
                .iter()
                .min_by_key(|(_, b)| b.window_start_ms)
                .map(|(k, _)| k.clone())
            {
                buckets.remove(&oldest);
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 60_000;
    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn first_call_opens_a_window() {
        let limiter = RateLimiter::new();
        let decision = limiter.check_at("webhook:course-1", 2, WINDOW, T0);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at_ms, T0 + WINDOW as i64);
    }

    #[test]
    fn rejects_after_limit_with_fixed_reset() {
        let limiter = RateLimiter::new();

        assert!(limiter.check_at("webhook:course-1", 2, WINDOW, T0).allowed);
        assert!(
            limiter
                .check_at("webhook:course-1", 2, WINDOW, T0 + 1_000)
                .allowed
        );

        let third = limiter.check_at("webhook:course-1", 2, WINDOW, T0 + 2_000);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        // Boundary stays at the window start, not at the last call.
        assert_eq!(third.reset_at_ms, T0 + WINDOW as i64);
        assert!(third.retry_after_secs(T0 + 2_000) <= 60);

        // Further rejected calls do not extend the window either.
        let fourth = limiter.check_at("webhook:course-1", 2, WINDOW, T0 + 3_000);
        assert_eq!(fourth.reset_at_ms, T0 + WINDOW as i64);
    }

    #[test]
    fn window_elapse_resets_the_counter() {
        let limiter = RateLimiter::new();
        for i in 0..3 {
            limiter.check_at("k", 2, WINDOW, T0 + i);
        }

        let after = limiter.check_at("k", 2, WINDOW, T0 + WINDOW as i64);
        assert!(after.allowed);
        assert_eq!(after.remaining, 1);
        assert_eq!(after.reset_at_ms, T0 + 2 * WINDOW as i64);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_at("a", 1, WINDOW, T0).allowed);
        assert!(!limiter.check_at("a", 1, WINDOW, T0 + 1).allowed);
        assert!(limiter.check_at("b", 1, WINDOW, T0 + 1).allowed);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let limiter = RateLimiter::new();
        for i in 0..5 {
            let d = limiter.check_at("k", 2, WINDOW, T0 + i);
            assert!(d.remaining <= 2);
        }
        let d = limiter.check_at("k", 2, WINDOW, T0 + 10);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn tracked_keys_stay_bounded() {
        let limiter = RateLimiter::with_capacity(4);
        for i in 0..10 {
            limiter.check_at(&format!("k{}", i), 1, WINDOW, T0 + i);
        }
        let buckets = limiter.buckets.lock().unwrap();
        assert!(buckets.len() <= 5);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    limiter.check_at("shared", 1_000_000, WINDOW, T0);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let d = limiter.check_at("shared", 1_000_000, WINDOW, T0);
        // 8 * 100 earlier calls plus this one.
        assert_eq!(d.remaining, 1_000_000 - 801);
    }
}
