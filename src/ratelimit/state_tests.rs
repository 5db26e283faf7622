//! Unit tests for LimiterState

#[cfg(test)]
mod tests {
    use crate::ratelimit::profile::ServiceProfile;
    use crate::ratelimit::state::{Adaptation, LimiterState};
    use crate::ratelimit::LimiterPhase;
    use std::time::Duration;
    use tokio::time::Instant;

    const HOUR: Duration = Duration::from_secs(3600);

    fn github_state(now: Instant) -> LimiterState {
        LimiterState::new(&ServiceProfile::github(), now)
    }

    /// Feeds `count` identical quota reports
    fn feed(state: &mut LimiterState, now: Instant, count: usize, limit: u64, remaining: u64) {
        for _ in 0..count {
            state.update_limits(limit, remaining, now + HOUR, now);
        }
    }

    #[test]
    fn test_new_state_uses_profile_quota() {
        let now = Instant::now();
        let state = github_state(now);
        assert_eq!(state.limit, 5000);
        assert_eq!(state.remaining, 5000);
        assert_eq!(state.reset_at, now + HOUR);
        assert_eq!(state.phase(now), LimiterPhase::Idle);
    }

    #[test]
    fn test_try_acquire_spends_one() {
        let now = Instant::now();
        let mut state = github_state(now);
        assert!(state.try_acquire(now));
        assert_eq!(state.remaining, 4999);
    }

    #[test]
    fn test_exhausted_quota_denies_until_reset() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.update_limits(5000, 0, now + HOUR, now);

        assert!(!state.can_proceed(now));
        assert!(!state.try_acquire(now + Duration::from_secs(1800)));
        assert_eq!(state.remaining, 0);
        assert_eq!(state.phase(now), LimiterPhase::Throttled);
    }

    #[test]
    fn test_window_expiry_replenishes_with_profile_window() {
        let now = Instant::now();
        let mut state = LimiterState::new(&ServiceProfile::gitlab(), now);
        state.update_limits(2000, 0, now + Duration::from_secs(10), now);

        let later = now + Duration::from_secs(11);
        assert!(state.try_acquire(later));
        assert_eq!(state.remaining, 1999);
        assert_eq!(state.reset_at, later + Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_overrides_remaining_quota() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.set_retry_after(Duration::from_secs(30), now);

        assert_eq!(state.remaining, 5000);
        assert!(!state.can_proceed(now + Duration::from_secs(5)));
        assert_eq!(state.phase(now), LimiterPhase::Throttled);
        assert_eq!(
            state.calculate_backoff(now + Duration::from_secs(10)),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_retry_after_expires() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.set_retry_after(Duration::from_secs(2), now);

        let later = now + Duration::from_secs(3);
        assert!(state.can_proceed(later));
        assert!(state.status(later).retry_after.is_none());
    }

    #[test]
    fn test_zero_retry_after_clears_pause() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.set_retry_after(Duration::from_secs(60), now);
        state.set_retry_after(Duration::ZERO, now);
        assert!(state.can_proceed(now));
    }

    #[test]
    fn test_denied_whenever_exhausted_or_paused() {
        let now = Instant::now();
        let reports: [(u64, u64); 5] = [(5000, 0), (100, 0), (1, 0), (5000, 10), (30, 3)];
        for (limit, remaining) in reports {
            let mut state = github_state(now);
            state.update_limits(limit, remaining, now + HOUR, now);
            if remaining == 0 {
                assert!(!state.can_proceed(now), "limit {limit} remaining 0 admitted");
            }
            state.set_retry_after(Duration::from_secs(1), now);
            assert!(!state.can_proceed(now), "limit {limit} admitted during retry-after");
        }
    }

    #[test]
    fn test_remaining_clamped_to_limit() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.update_limits(100, 250, now + HOUR, now);
        assert_eq!(state.remaining, 100);
    }

    #[test]
    fn test_backoff_healthy_quota_uses_min_backoff() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.update_limits(5000, 4000, now + HOUR, now);
        assert_eq!(state.calculate_backoff(now), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_after_reset_uses_min_backoff() {
        let now = Instant::now();
        let mut state = github_state(now);
        state.update_limits(5000, 0, now + Duration::from_secs(1), now);
        assert_eq!(
            state.calculate_backoff(now + Duration::from_secs(2)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_backoff_monotonic_as_quota_falls() {
        let now = Instant::now();
        let mut previous = Duration::ZERO;
        for remaining in (0..=50).rev() {
            let mut state = github_state(now);
            state.update_limits(100, remaining, now + HOUR, now);
            let backoff = state.calculate_backoff(now);
            assert!(
                backoff >= previous,
                "backoff dropped at remaining {remaining}: {backoff:?} < {previous:?}"
            );
            assert!(backoff <= state.max_backoff);
            previous = backoff;
        }
        // minBackoff × 2.0^1 minus 10% jitter at an empty quota
        assert!((previous.as_secs_f64() - 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let now = Instant::now();
        let profile = ServiceProfile::github()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(12));
        let mut state = LimiterState::new(&profile, now);
        state.update_limits(100, 0, now + HOUR, now);
        assert_eq!(state.calculate_backoff(now), Duration::from_secs(12));
    }

    #[test]
    fn test_adaptation_needs_ten_reports() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 9, 5000, 0);
        assert_eq!(state.adapt_backoff_strategy(), Adaptation::InsufficientHistory);
        assert_eq!(state.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_throttled_majority_increases_conservatism() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 10, 5000, 100);

        let multiplier = state.backoff_multiplier;
        let min_backoff = state.min_backoff;
        assert_eq!(state.adapt_backoff_strategy(), Adaptation::MoreConservative);
        assert!(state.backoff_multiplier > multiplier);
        assert!(state.min_backoff > min_backoff);
        assert!((state.backoff_multiplier - 2.2).abs() < 1e-9);
        assert!((state.min_backoff.as_secs_f64() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_multiplier_capped_at_three() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 10, 5000, 0);
        for _ in 0..20 {
            state.adapt_backoff_strategy();
        }
        assert!((state.backoff_multiplier - 3.0).abs() < 1e-9);
        assert!(state.min_backoff <= state.max_backoff);
    }

    #[test]
    fn test_healthy_history_decreases_conservatism() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 10, 5000, 500);

        let multiplier = state.backoff_multiplier;
        let min_backoff = state.min_backoff;
        assert_eq!(state.adapt_backoff_strategy(), Adaptation::LessConservative);
        assert!(state.backoff_multiplier < multiplier);
        assert!(state.min_backoff < min_backoff);
    }

    #[test]
    fn test_multiplier_floored_and_min_backoff_bounded() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 10, 5000, 5000);
        for _ in 0..200 {
            state.adapt_backoff_strategy();
        }
        assert!((state.backoff_multiplier - 1.2).abs() < 1e-9);
        assert_eq!(state.min_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_mixed_history_leaves_parameters_unchanged() {
        let now = Instant::now();
        let mut state = github_state(now);
        feed(&mut state, now, 7, 5000, 4000);
        feed(&mut state, now, 3, 5000, 0);
        assert_eq!(state.adapt_backoff_strategy(), Adaptation::Unchanged);
        assert_eq!(state.backoff_multiplier, 2.0);
        assert_eq!(state.min_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_update_limits_counts_adjustment_only_on_limit_change() {
        let now = Instant::now();
        let mut state = github_state(now);

        assert!(state.update_limits(5000, 10, now + HOUR, now).is_none());
        assert_eq!(state.stats.adaptive_adjustments, 0);

        let outcome = state.update_limits(6000, 10, now + HOUR, now);
        assert_eq!(outcome, Some(Adaptation::InsufficientHistory));
        assert_eq!(state.stats.adaptive_adjustments, 1);
        assert!(state.stats.last_reset.is_some());
    }

    #[test]
    fn test_non_adaptive_profile_never_adapts() {
        let now = Instant::now();
        let profile = ServiceProfile::github().with_adaptive(false);
        let mut state = LimiterState::new(&profile, now);
        for limit in 1..=20 {
            state.update_limits(limit, 0, now + HOUR, now);
        }
        assert_eq!(state.stats.adaptive_adjustments, 0);
        assert_eq!(state.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_history_bounded_at_capacity() {
        let now = Instant::now();
        let mut state = github_state(now);
        for i in 0..150 {
            state.update_limits(5000, i, now + HOUR, now);
        }
        assert_eq!(state.history.len(), 100);
        assert_eq!(state.history.latest(1).next().map(|s| s.remaining), Some(149));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let now = Instant::now();
        let profile = ServiceProfile::github().with_window(Duration::MAX);
        let mut state = LimiterState::new(&profile, now);
        assert!(state.reset_at > now + HOUR);

        // Force a replenish with the same oversized window
        state.update_limits(10, 0, now, now);
        assert!(state.try_acquire(now));
        assert!(state.reset_at > now + HOUR);
    }

    #[test]
    fn test_zero_min_backoff_clamped_to_floor() {
        let now = Instant::now();
        let profile = ServiceProfile::github().with_backoff(Duration::ZERO, Duration::ZERO);
        let mut state = LimiterState::new(&profile, now);
        state.update_limits(100, 0, now + HOUR, now);

        assert_eq!(state.min_backoff, Duration::from_millis(10));
        assert!(state.calculate_backoff(now) >= Duration::from_millis(10));
    }
}
