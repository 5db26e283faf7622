//! Overflow-free arithmetic on the monotonic clock

use std::time::Duration;
use tokio::time::Instant;

// About 30 years out; treated as "never"
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, saturating at a far-future instant instead of panicking
pub(crate) fn instant_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_addition() {
        let now = Instant::now();
        assert_eq!(
            instant_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
    }

    #[test]
    fn test_overflow_saturates_far_ahead() {
        let now = Instant::now();
        let later = instant_after(now, Duration::MAX);
        assert!(later >= now + FAR_FUTURE);
    }
}
