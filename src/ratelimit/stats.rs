//! Statistics tracking and reporting for rate limiters

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::utils::format_duration;

/// Cumulative counters for one limiter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStats {
    /// Every call to `wait`
    pub total_requests: u64,
    /// Calls that missed the fast path and had to queue (or were rejected)
    pub throttled_requests: u64,
    /// Calls rejected because the queue was full
    pub rejected_requests: u64,
    /// Queued requests admitted by the pacing loop
    pub queued_admissions: u64,
    /// Times the provider changed its limit while adaptive mode was on
    pub adaptive_adjustments: u64,
    /// Mean time queued requests waited before admission
    #[serde(rename = "average_wait_ms", serialize_with = "serialize_millis")]
    pub average_wait: Duration,
    /// Share of requests admitted without queueing
    pub efficiency: f64,
    /// When the provider last reported quota
    pub last_reset: Option<DateTime<Utc>>,
}

impl Default for LimiterStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            throttled_requests: 0,
            rejected_requests: 0,
            queued_admissions: 0,
            adaptive_adjustments: 0,
            average_wait: Duration::ZERO,
            efficiency: 1.0,
            last_reset: None,
        }
    }
}

impl LimiterStats {
    pub(crate) fn record_request(&mut self) {
        self.total_requests += 1;
        self.refresh_efficiency();
    }

    pub(crate) fn record_throttled(&mut self) {
        self.throttled_requests += 1;
        self.refresh_efficiency();
    }

    pub(crate) fn record_rejected(&mut self) {
        self.rejected_requests += 1;
    }

    /// Folds one queued admission into the running mean wait time
    pub(crate) fn record_queued_admission(&mut self, waited: Duration) {
        self.queued_admissions += 1;
        let n = self.queued_admissions as f64;
        let mean = self.average_wait.as_secs_f64();
        let next = mean + (waited.as_secs_f64() - mean) / n;
        self.average_wait = Duration::from_secs_f64(next.max(0.0));
    }

    pub(crate) fn refresh_efficiency(&mut self) {
        if self.total_requests == 0 {
            self.efficiency = 1.0;
            return;
        }
        let immediate = self.total_requests.saturating_sub(self.throttled_requests);
        self.efficiency = immediate as f64 / self.total_requests as f64;
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_optional_millis<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Whether the limiter would currently admit a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterPhase {
    /// Quota left and no server-mandated pause
    Idle,
    /// Quota exhausted or a Retry-After pause is active
    Throttled,
}

impl LimiterPhase {
    /// Returns the emoji symbol for this phase
    pub fn symbol(&self) -> &str {
        match self {
            LimiterPhase::Idle => "🟢",
            LimiterPhase::Throttled => "🟡",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            LimiterPhase::Idle => "idle",
            LimiterPhase::Throttled => "throttled",
        }
    }
}

/// Current quota belief of a limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: tokio::time::Instant,
    /// Remaining part of an active Retry-After pause
    pub retry_after: Option<Duration>,
}

impl QuotaStatus {
    pub fn resets_in(&self) -> Duration {
        self.reset_at
            .saturating_duration_since(tokio::time::Instant::now())
    }
}

/// Everything the CLI shows about one limiter
#[derive(Debug, Clone, Serialize)]
pub struct LimiterReport {
    pub service: String,
    pub phase: LimiterPhase,
    pub limit: u64,
    pub remaining: u64,
    #[serde(rename = "resets_in_ms", serialize_with = "serialize_millis")]
    pub resets_in: Duration,
    #[serde(rename = "retry_after_ms", serialize_with = "serialize_optional_millis")]
    pub retry_after: Option<Duration>,
    pub backoff_multiplier: f64,
    #[serde(rename = "min_backoff_ms", serialize_with = "serialize_millis")]
    pub min_backoff: Duration,
    pub queue_capacity: usize,
    pub stats: LimiterStats,
}

impl fmt::Display for LimiterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "=== Rate Limiter Statistics ({}) ===", self.service)?;
        writeln!(f, "State:                {} {}", self.phase.symbol(), self.phase.text())?;
        writeln!(f, "Current Limit:        {}", self.limit)?;
        writeln!(f, "Remaining:            {}", self.remaining)?;
        writeln!(f, "Resets In:            {}", format_duration(self.resets_in))?;
        if let Some(retry_after) = self.retry_after {
            writeln!(f, "Retry After:          {}", format_duration(retry_after))?;
        }
        writeln!(f, "Backoff Multiplier:   {:.2}", self.backoff_multiplier)?;
        writeln!(f, "Min Backoff:          {}", format_duration(self.min_backoff))?;
        writeln!(f, "Queue Capacity:       {}", self.queue_capacity)?;
        writeln!(f, "Total Requests:       {}", stats.total_requests)?;
        writeln!(f, "Throttled Requests:   {}", stats.throttled_requests)?;
        writeln!(f, "Rejected Requests:    {}", stats.rejected_requests)?;
        writeln!(f, "Adaptive Adjustments: {}", stats.adaptive_adjustments)?;
        writeln!(f, "Average Wait Time:    {}", format_duration(stats.average_wait))?;
        writeln!(f, "Efficiency Rate:      {:.2}%", stats.efficiency * 100.0)?;
        match stats.last_reset {
            Some(at) => write!(f, "Last Reset:           {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "Last Reset:           never"),
        }
    }
}
