//! Cancellation and deadline context for rate limit waits

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::clock::instant_after;
use super::error::RateLimitError;

/// Carries a caller's cancellation token and optional deadline into
/// [`RateLimiter::wait`](super::RateLimiter::wait).
///
/// Clones share the same token, so cancelling any clone cancels the wait.
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(instant_after(Instant::now(), timeout))
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Wraps an externally owned token, e.g. one shared with a whole command run
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Adds or tightens the deadline, keeping the same token
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let deadline = instant_after(Instant::now(), timeout);
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the context error if the context is already done
    pub fn err(&self) -> Option<RateLimitError> {
        if self.token.is_cancelled() {
            return Some(RateLimitError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(RateLimitError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> RateLimitError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => RateLimitError::Cancelled,
                    () = tokio::time::sleep_until(deadline) => RateLimitError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                RateLimitError::Cancelled
            }
        }
    }
}
