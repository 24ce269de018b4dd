//! # Keyed load rate limiter.
//!
//! The auction service may ask the client to back off a placement for a while.
//! [`LoadRateLimiter`] records that cool-down per key and answers how long a
//! caller still has to wait.
//!
//! ## Rules
//! - No entry, or a limit of zero, means "no limit".
//! - Setting a limit restarts its countdown.
//! - The wait never goes below zero.
//!
//! The table sits behind one `parking_lot::Mutex`: every operation is O(1) and
//! callers may come from any thread, including threads outside the dispatcher.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Contract the load path relies on; lets tests supply fixed answers.
pub trait LoadRateLimiting: Send + Sync + 'static {
    /// Remaining cool-down for `key`, zero if loads are allowed.
    fn time_until_next_load_is_allowed(&self, key: &str) -> Duration;

    /// Stored limit for `key`, zero if none.
    fn load_rate_limit(&self, key: &str) -> Duration;

    /// Stores `value` for `key` and restarts its countdown.
    fn set_load_rate_limit(&self, value: Duration, key: &str);

    /// Seconds form of [`set_load_rate_limit`](Self::set_load_rate_limit);
    /// negative and NaN values are clamped to zero, overflowing ones saturate.
    fn set_load_rate_limit_secs(&self, seconds: f64, key: &str) {
        let value = if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        self.set_load_rate_limit(value, key);
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    limit: Duration,
    reset_at: Instant,
}

/// Thread-safe [`LoadRateLimiting`] backed by a single table.
#[derive(Debug, Default)]
pub struct LoadRateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl LoadRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadRateLimiting for LoadRateLimiter {
    fn time_until_next_load_is_allowed(&self, key: &str) -> Duration {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return Duration::ZERO;
        };
        entry.limit.saturating_sub(entry.reset_at.elapsed())
    }

    fn load_rate_limit(&self, key: &str) -> Duration {
        self.entries
            .lock()
            .get(key)
            .map_or(Duration::ZERO, |entry| entry.limit)
    }

    fn set_load_rate_limit(&self, value: Duration, key: &str) {
        tracing::debug!(placement = key, limit = ?value, "load rate limit set");
        self.entries.lock().insert(
            key.to_string(),
            RateLimitEntry {
                limit: value,
                reset_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_unknown_key_has_no_limit() {
        let limiter = LoadRateLimiter::new();
        assert_eq!(limiter.time_until_next_load_is_allowed("main"), Duration::ZERO);
        assert_eq!(limiter.load_rate_limit("main"), Duration::ZERO);
    }

    #[test]
    fn test_wait_starts_at_limit_and_decreases() {
        let limiter = LoadRateLimiter::new();
        limiter.set_load_rate_limit(Duration::from_secs(10), "main");

        let first = limiter.time_until_next_load_is_allowed("main");
        assert!(first <= Duration::from_secs(10));
        assert!(first > Duration::from_millis(9_900));

        thread::sleep(Duration::from_millis(20));
        let second = limiter.time_until_next_load_is_allowed("main");
        assert!(second < first);
        assert_eq!(limiter.load_rate_limit("main"), Duration::from_secs(10));
    }

    #[test]
    fn test_wait_never_goes_below_zero() {
        let limiter = LoadRateLimiter::new();
        limiter.set_load_rate_limit(Duration::from_millis(5), "main");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.time_until_next_load_is_allowed("main"), Duration::ZERO);
    }

    #[test]
    fn test_zero_limit_means_no_limit() {
        let limiter = LoadRateLimiter::new();
        limiter.set_load_rate_limit(Duration::ZERO, "main");
        assert_eq!(limiter.time_until_next_load_is_allowed("main"), Duration::ZERO);
    }

    #[test]
    fn test_negative_seconds_clamp_to_zero() {
        let limiter = LoadRateLimiter::new();
        limiter.set_load_rate_limit_secs(-3.0, "main");
        assert_eq!(limiter.load_rate_limit("main"), Duration::ZERO);
        limiter.set_load_rate_limit_secs(f64::NAN, "other");
        assert_eq!(limiter.load_rate_limit("other"), Duration::ZERO);
        limiter.set_load_rate_limit_secs(1.5, "main");
        assert_eq!(limiter.load_rate_limit("main"), Duration::from_millis(1_500));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = LoadRateLimiter::new();
        limiter.set_load_rate_limit(Duration::from_secs(30), "a");
        limiter.set_load_rate_limit(Duration::from_secs(5), "b");
        limiter.set_load_rate_limit(Duration::from_secs(60), "b");
        assert_eq!(limiter.load_rate_limit("a"), Duration::from_secs(30));
        assert_eq!(limiter.load_rate_limit("b"), Duration::from_secs(60));
    }

    #[test]
    fn test_concurrent_writers_on_distinct_and_shared_keys() {
        let limiter = Arc::new(LoadRateLimiter::new());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    for j in 0..200u64 {
                        limiter.set_load_rate_limit(Duration::from_secs(i + 1), &format!("key-{i}"));
                        limiter.set_load_rate_limit(Duration::from_secs(j), "shared");
                        let _ = limiter.time_until_next_load_is_allowed("shared");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8u64 {
            assert_eq!(limiter.load_rate_limit(&format!("key-{i}")), Duration::from_secs(i + 1));
        }
        assert_eq!(limiter.load_rate_limit("shared"), Duration::from_secs(199));
    }
}
