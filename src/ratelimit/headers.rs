//! Parse provider rate limit headers into limiter feedback.
//!
//! GitHub and Gitea send `X-RateLimit-{Limit,Remaining,Reset}`, GitLab sends
//! `RateLimit-{Limit,Remaining,Reset}`. The reset is a Unix timestamp for all
//! three; small values are read as delta-seconds per the IETF
//! [RateLimit header draft](https://datatracker.ietf.org/doc/draft-ietf-httpapi-ratelimit-headers/).

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::Instant;

const LIMIT_HEADERS: &[&str] = &["x-ratelimit-limit", "ratelimit-limit", "x-rate-limit-limit"];
const REMAINING_HEADERS: &[&str] = &[
    "x-ratelimit-remaining",
    "ratelimit-remaining",
    "x-rate-limit-remaining",
];
const RESET_HEADERS: &[&str] = &["x-ratelimit-reset", "ratelimit-reset", "x-rate-limit-reset"];

// Reset values below one year are delta-seconds rather than epoch timestamps
const DELTA_RESET_CUTOFF_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?
        .trim();

    // Retry-After = HTTP-date / delay-seconds
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    DateTime::parse_from_rfc2822(value)
        .map(|date| {
            (date.with_timezone(&Utc) - Utc::now())
                .to_std()
                // a date in the past means no wait
                .unwrap_or(Duration::ZERO)
        })
        .map_err(|_| RetryAfterParseError::ValueError(value.into()))
}

fn parse_number(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    })
}

/// Converts a reset header value into a point on the monotonic clock
fn reset_instant(value: u64, now: Instant) -> Option<Instant> {
    if value < DELTA_RESET_CUTOFF_SECS {
        return now.checked_add(Duration::from_secs(value));
    }

    let reset = UNIX_EPOCH.checked_add(Duration::from_secs(value))?;
    let until = reset
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    now.checked_add(until)
}

/// Quota information reported by one provider response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitFeedback {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<Instant>,
    pub retry_after: Option<Duration>,
    /// The response itself was a rate limit rejection
    pub throttled: bool,
}

impl RateLimitFeedback {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_headers_at(headers, Instant::now())
    }

    fn from_headers_at(headers: &HeaderMap, now: Instant) -> Self {
        let reset_at =
            parse_number(headers, RESET_HEADERS).and_then(|value| reset_instant(value, now));
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| parse_retry_after(value).ok());

        Self {
            limit: parse_number(headers, LIMIT_HEADERS),
            remaining: parse_number(headers, REMAINING_HEADERS),
            reset_at,
            retry_after,
            throttled: false,
        }
    }

    /// Like [`Self::from_headers`], additionally classifying 429 responses and
    /// 403 responses with an exhausted quota (GitHub's primary and secondary
    /// limits) as throttled. A throttled response without Retry-After waits
    /// until the reported reset.
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Self {
        let now = Instant::now();
        let mut feedback = Self::from_headers_at(headers, now);

        feedback.throttled = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN
                && (feedback.remaining == Some(0) || feedback.retry_after.is_some()));

        if feedback.throttled && feedback.retry_after.is_none() {
            feedback.retry_after = feedback
                .reset_at
                .map(|reset| reset.saturating_duration_since(now))
                .filter(|wait| !wait.is_zero());
        }

        feedback
    }

    /// Limit, remaining and reset, when the response carried all three
    pub fn quota(&self) -> Option<(u64, u64, Instant)> {
        Some((self.limit?, self.remaining?, self.reset_at?))
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_at.is_none()
            && self.retry_after.is_none()
            && !self.throttled
    }
}
