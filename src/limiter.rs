// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter keyed by caller.
//!
//! Each caller key owns one window. The first request opens the window,
//! later requests count against it until `max_requests` is reached, and the
//! window resets once its end has passed. Bursts straddling a boundary are
//! admitted.

use crate::clock::{Clock, SystemClock};
use crate::config::RatePolicy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Whole seconds a rejected caller should wait, rounded up
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::Limited { retry_after } => {
                let secs = retry_after.as_secs();
                Some(if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs })
            }
        }
    }
}

/// Admission window for one caller.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Thread-safe fixed-window rate limiter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    windows: RwLock<HashMap<String, RateWindow>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `caller_key`.
    pub async fn admit(&self, caller_key: &str, max_requests: u32, window: Duration) -> bool {
        self.check(caller_key, max_requests, window).await.is_allowed()
    }

    /// Like [`admit`](Self::admit) but takes a configured policy.
    pub async fn check_policy(&self, caller_key: &str, policy: &RatePolicy) -> RateLimitResult {
        self.check(caller_key, policy.max_requests, policy.window())
            .await
    }

    /// Check and update the window for `caller_key`.
    ///
    /// The decision and the increment happen under one write guard.
    pub async fn check(&self, caller_key: &str, max_requests: u32, window: Duration) -> RateLimitResult {
        let now = self.clock.now();
        let mut windows = self.windows.write().await;

        if let Some(current) = windows
            .get_mut(caller_key)
            .filter(|w| now <= w.reset_at)
        {
            if current.count >= max_requests {
                let retry_after = current.reset_at.duration_since(now);
                debug!(caller = %caller_key, ?retry_after, "Caller rate limit exceeded");
                return RateLimitResult::Limited { retry_after };
            }
            current.count += 1;
            return RateLimitResult::Allowed {
                remaining: max_requests - current.count,
                reset_in: current.reset_at.duration_since(now),
            };
        }

        // No window yet, or the old one has ended
        windows.insert(
            caller_key.to_string(),
            RateWindow {
                count: 1,
                reset_at: now + window,
            },
        );
        RateLimitResult::Allowed {
            remaining: max_requests.saturating_sub(1),
            reset_in: window,
        }
    }

    /// Drop windows that have already expired (should be called periodically).
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now <= w.reset_at);
        before - windows.len()
    }

    /// Number of tracked caller keys
    pub async fn tracked(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_with_clock() -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        (RateLimiter::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_window_admits_then_rejects_then_resets() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_millis(1000);

        let decisions = [
            limiter.admit("10.0.0.1", 3, window).await,
            limiter.admit("10.0.0.1", 3, window).await,
            limiter.admit("10.0.0.1", 3, window).await,
            limiter.admit("10.0.0.1", 3, window).await,
        ];
        assert_eq!(decisions, [true, true, true, false]);

        clock.advance(Duration::from_millis(1001));
        assert!(limiter.admit("10.0.0.1", 3, window).await);
    }

    #[tokio::test]
    async fn test_rejection_does_not_extend_window() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("caller", 1, window).await);
        clock.advance(Duration::from_secs(30));
        for _ in 0..5 {
            assert!(!limiter.admit("caller", 1, window).await);
        }
        clock.advance(Duration::from_secs(31));
        assert!(limiter.admit("caller", 1, window).await);
    }

    #[tokio::test]
    async fn test_callers_are_independent() {
        let (limiter, _clock) = limiter_with_clock();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("a", 1, window).await);
        assert!(!limiter.admit("a", 1, window).await);
        assert!(limiter.admit("b", 1, window).await);
    }

    #[tokio::test]
    async fn test_limited_reports_retry_after() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_secs(60);

        limiter.check("ip", 1, window).await;
        clock.advance(Duration::from_millis(20_500));
        let result = limiter.check("ip", 1, window).await;
        assert_eq!(result.retry_after_secs(), Some(40));
    }

    #[tokio::test]
    async fn test_cleanup_evicts_expired_windows() {
        let (limiter, clock) = limiter_with_clock();

        limiter.admit("old", 5, Duration::from_secs(1)).await;
        limiter.admit("fresh", 5, Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(2));

        assert_eq!(limiter.cleanup().await, 1);
        assert_eq!(limiter.tracked().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_admission_never_overcounts() {
        let limiter = Arc::new(RateLimiter::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.admit("shared", 20, Duration::from_secs(60)).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }
}
