//! Quota belief and adaptive backoff parameters of a single limiter
//!
//! Everything here is synchronous and takes `now` explicitly; the limiter
//! wraps a [`LimiterState`] in one `RwLock` and supplies the clock.

use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;

use super::clock::instant_after;
use super::config::{
    ADAPTATION_SAMPLE_SIZE, HEALTHY_QUOTA_RATIO, HISTORY_CAPACITY, JITTER_FACTOR,
    MIN_BACKOFF_FLOOR, MIN_BACKOFF_STEP_DOWN, MIN_BACKOFF_STEP_UP, MULTIPLIER_CEILING,
    MULTIPLIER_FLOOR, MULTIPLIER_STEP_DOWN, MULTIPLIER_STEP_UP, THROTTLED_MAJORITY,
    THROTTLED_MINORITY, THROTTLED_QUOTA_RATIO,
};
use super::history::History;
use super::profile::ServiceProfile;
use super::stats::{LimiterPhase, LimiterStats, QuotaStatus};

/// One provider quota report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub observed_at: Instant,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Instant,
}

impl QuotaSnapshot {
    pub fn quota_ratio(&self) -> f64 {
        quota_ratio(self.remaining, self.limit)
    }

    /// Less than 10% of the quota was left when this report arrived
    pub fn is_throttled(&self) -> bool {
        self.quota_ratio() < THROTTLED_QUOTA_RATIO
    }
}

fn quota_ratio(remaining: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    remaining as f64 / limit as f64
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// A server-mandated pause that expires on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryAfter {
    set_at: Instant,
    duration: Duration,
}

impl RetryAfter {
    fn remaining(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.set_at))
    }
}

/// Outcome of one adaptation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Adaptation {
    InsufficientHistory,
    MoreConservative,
    LessConservative,
    Unchanged,
}

#[derive(Debug)]
pub(crate) struct LimiterState {
    pub(crate) limit: u64,
    pub(crate) remaining: u64,
    pub(crate) reset_at: Instant,
    retry_after: Option<RetryAfter>,
    pub(crate) backoff_multiplier: f64,
    pub(crate) min_backoff: Duration,
    pub(crate) max_backoff: Duration,
    window: Duration,
    adaptive: bool,
    pub(crate) history: History<QuotaSnapshot>,
    pub(crate) stats: LimiterStats,
}

impl LimiterState {
    pub(crate) fn new(profile: &ServiceProfile, now: Instant) -> Self {
        // Parked requests always sleep at least the floor
        let min_backoff = profile.min_backoff.max(MIN_BACKOFF_FLOOR);

        Self {
            limit: profile.initial_limit,
            remaining: profile.initial_limit,
            reset_at: instant_after(now, profile.window),
            retry_after: None,
            backoff_multiplier: profile.backoff_multiplier,
            min_backoff,
            max_backoff: profile.max_backoff.max(min_backoff),
            window: profile.window,
            adaptive: profile.adaptive,
            history: History::new(HISTORY_CAPACITY),
            stats: LimiterStats::default(),
        }
    }

    /// Refills the quota once the reset time has passed
    fn replenish_if_expired(&mut self, now: Instant) {
        if now >= self.reset_at {
            self.remaining = self.limit;
            self.reset_at = instant_after(now, self.window);
        }
    }

    fn active_retry_after(&self, now: Instant) -> Option<Duration> {
        self.retry_after
            .map(|retry| retry.remaining(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Admission check without spending; replenishes an expired window and
    /// drops an elapsed Retry-After
    pub(crate) fn can_proceed(&mut self, now: Instant) -> bool {
        self.replenish_if_expired(now);

        if self.retry_after.is_some() && self.active_retry_after(now).is_none() {
            self.retry_after = None;
        }
        if self.retry_after.is_some() {
            return false;
        }

        self.remaining > 0
    }

    /// Check-then-spend: the only place `remaining` is decremented
    pub(crate) fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.can_proceed(now) {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub(crate) fn set_retry_after(&mut self, duration: Duration, now: Instant) {
        self.retry_after = if duration.is_zero() {
            None
        } else {
            Some(RetryAfter {
                set_at: now,
                duration,
            })
        };
    }

    /// Authoritative resync from provider headers; returns the adaptation
    /// outcome when the limit changed in adaptive mode
    pub(crate) fn update_limits(
        &mut self,
        limit: u64,
        remaining: u64,
        reset_at: Instant,
        now: Instant,
    ) -> Option<Adaptation> {
        let remaining = remaining.min(limit);
        self.history.push(QuotaSnapshot {
            observed_at: now,
            limit,
            remaining,
            reset_at,
        });

        let previous_limit = self.limit;
        self.limit = limit;
        self.remaining = remaining;
        self.reset_at = reset_at;
        self.stats.last_reset = Some(Utc::now());

        let adaptation = if self.adaptive && limit != previous_limit {
            self.stats.adaptive_adjustments += 1;
            Some(self.adapt_backoff_strategy())
        } else {
            None
        };

        self.stats.refresh_efficiency();
        adaptation
    }

    /// Delay before a denied request is re-evaluated
    pub(crate) fn calculate_backoff(&self, now: Instant) -> Duration {
        if let Some(retry_after) = self.active_retry_after(now) {
            return retry_after;
        }

        if now >= self.reset_at {
            return self.min_backoff;
        }

        let ratio = quota_ratio(self.remaining, self.limit);
        if ratio > HEALTHY_QUOTA_RATIO {
            return self.min_backoff;
        }

        let base = self.min_backoff.as_secs_f64() * self.backoff_multiplier.powf(1.0 - ratio);
        let jitter = base * JITTER_FACTOR * (2.0 * ratio.clamp(0.0, 1.0) - 1.0);

        Duration::try_from_secs_f64((base + jitter).max(0.0))
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Hysteresis controller over the most recent quota reports
    pub(crate) fn adapt_backoff_strategy(&mut self) -> Adaptation {
        if self.history.len() < ADAPTATION_SAMPLE_SIZE {
            return Adaptation::InsufficientHistory;
        }

        let throttled = self
            .history
            .latest(ADAPTATION_SAMPLE_SIZE)
            .filter(|snapshot| snapshot.is_throttled())
            .count();

        if throttled > THROTTLED_MAJORITY {
            self.backoff_multiplier = (self.backoff_multiplier * MULTIPLIER_STEP_UP)
                .min(MULTIPLIER_CEILING.max(self.backoff_multiplier));
            self.min_backoff = scale(self.min_backoff, MIN_BACKOFF_STEP_UP)
                .min(self.max_backoff)
                .max(self.min_backoff);
            Adaptation::MoreConservative
        } else if throttled < THROTTLED_MINORITY {
            self.backoff_multiplier = (self.backoff_multiplier * MULTIPLIER_STEP_DOWN)
                .max(MULTIPLIER_FLOOR.min(self.backoff_multiplier));
            self.min_backoff = scale(self.min_backoff, MIN_BACKOFF_STEP_DOWN)
                .max(MIN_BACKOFF_FLOOR)
                .min(self.min_backoff);
            Adaptation::LessConservative
        } else {
            Adaptation::Unchanged
        }
    }

    pub(crate) fn phase(&self, now: Instant) -> LimiterPhase {
        let exhausted = self.remaining == 0 && now < self.reset_at;
        if exhausted || self.active_retry_after(now).is_some() {
            LimiterPhase::Throttled
        } else {
            LimiterPhase::Idle
        }
    }

    pub(crate) fn status(&self, now: Instant) -> QuotaStatus {
        QuotaStatus {
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
            retry_after: self.active_retry_after(now),
        }
    }
}
