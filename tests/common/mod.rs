//! Common test utilities and helpers
#![allow(dead_code, unused_imports)]

use repos_ratelimit::ratelimit::{LimiterStats, RateLimiter, ServiceProfile};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

static TEST_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Acquires a global lock for tests that modify process-wide state (like env vars)
pub fn lock_test() -> MutexGuard<'static, ()> {
    TEST_MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

/// A github-shaped profile with a tiny quota and fast backoff
pub fn small_profile(limit: u64, queue_capacity: usize) -> ServiceProfile {
    ServiceProfile::github()
        .with_service("test")
        .with_initial_limit(limit)
        .with_queue_capacity(queue_capacity)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(100))
}

/// Spends the whole initial quota through the fast path
pub async fn exhaust(limiter: &RateLimiter) {
    let limit = limiter.current_status().limit;
    for _ in 0..limit {
        limiter
            .wait(&repos_ratelimit::ratelimit::WaitContext::background())
            .await
            .unwrap();
    }
    assert_eq!(limiter.current_status().remaining, 0);
}

/// Polls the limiter statistics until `done` holds or two seconds pass
pub async fn wait_for_stats(limiter: &RateLimiter, done: impl Fn(&LimiterStats) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done(&limiter.stats()) {
        assert!(Instant::now() < deadline, "timed out waiting for {:?}", limiter.stats());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
