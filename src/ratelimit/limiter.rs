//! Adaptive admission gate for a single provider
//!
//! Callers `wait` before every provider request and report the provider's
//! quota headers afterwards. Requests that cannot be admitted immediately are
//! queued and released by the background [pacing loop](super::pacer).

use log::{debug, trace, warn};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::WaitContext;
use super::error::RateLimitError;
use super::headers::RateLimitFeedback;
use super::pacer::Pacer;
use super::profile::{ProfileTable, ServiceProfile};
use super::state::{LimiterState, QuotaSnapshot};
use super::stats::{LimiterPhase, LimiterReport, LimiterStats, QuotaStatus};

type Response = Result<(), RateLimitError>;

/// A queued waiter. Resolved exactly once: by sending on `responder`, or by
/// being dropped, which the waiter observes as a stopped limiter.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    ctx: WaitContext,
    responder: oneshot::Sender<Response>,
    pub(crate) enqueued_at: Instant,
    // Holds one queue slot until the request is resolved or dropped
    _slot: OwnedSemaphorePermit,
}

impl PendingRequest {
    pub(crate) fn resolve(self, response: Response) {
        if self.responder.send(response).is_err() {
            trace!("Waiter went away before its request resolved");
        }
    }

    /// The waiter stopped listening or its context is done
    pub(crate) fn is_abandoned(&self) -> bool {
        self.responder.is_closed() || self.ctx.err().is_some()
    }

    /// Resolves once the waiter stops listening
    pub(crate) async fn abandoned(&mut self) {
        self.responder.closed().await;
    }
}

/// State shared between the limiter handle, its pacing loop and requeue tasks
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) profile: ServiceProfile,
    state: RwLock<LimiterState>,
    pub(crate) shutdown: CancellationToken,
}

impl Shared {
    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, LimiterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, LimiterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stopped_error(&self) -> RateLimitError {
        RateLimitError::Stopped {
            service: self.profile.service.clone(),
        }
    }

    /// Spends one unit of quota for a queued request if the limiter allows it
    pub(crate) fn try_admit(&self, request: &PendingRequest) -> bool {
        let now = Instant::now();
        let mut state = self.write_state();
        if !state.try_acquire(now) {
            return false;
        }
        state
            .stats
            .record_queued_admission(now.saturating_duration_since(request.enqueued_at));
        true
    }

    pub(crate) fn calculate_backoff(&self) -> Duration {
        self.read_state().calculate_backoff(Instant::now())
    }
}

/// Rate limiter for one provider service
///
/// # Example
///
/// ```rust,no_run
/// use repos_ratelimit::ratelimit::{RateLimiter, WaitContext};
/// use std::time::Duration;
///
/// # async fn run() -> Result<(), repos_ratelimit::ratelimit::RateLimitError> {
/// let limiter = RateLimiter::for_service("github");
/// limiter.wait(&WaitContext::with_timeout(Duration::from_secs(30))).await?;
/// // ... issue the request, then report the headers back:
/// // limiter.observe_response(response.status(), response.headers());
/// limiter.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    shared: Arc<Shared>,
    queue: mpsc::Sender<PendingRequest>,
    slots: Arc<Semaphore>,
    // Held across the join so overlapping stop() calls all wait for it
    pacer: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Creates a limiter and starts its pacing loop
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime
    pub fn new(profile: ServiceProfile) -> Self {
        let capacity = profile.queue_capacity.max(1);
        let (queue, receiver) = mpsc::channel(capacity);

        debug!(
            "Starting rate limiter for {} ({} requests per {}s, queue {})",
            profile.service,
            profile.initial_limit,
            profile.window.as_secs(),
            capacity
        );

        let shared = Arc::new(Shared {
            state: RwLock::new(LimiterState::new(&profile, Instant::now())),
            profile,
            shutdown: CancellationToken::new(),
        });
        let pacer = Pacer::new(Arc::clone(&shared), receiver, queue.clone()).spawn();

        Self {
            shared,
            queue,
            slots: Arc::new(Semaphore::new(capacity)),
            pacer: Mutex::new(Some(pacer)),
        }
    }

    /// Creates a limiter from the built-in profile table
    pub fn for_service(service: &str) -> Self {
        Self::new(ProfileTable::builtin().resolve(service))
    }

    pub fn service(&self) -> &str {
        &self.shared.profile.service
    }

    pub fn profile(&self) -> &ServiceProfile {
        &self.shared.profile
    }

    /// Blocks until a request may be sent to the provider
    ///
    /// Returns immediately when quota is available. Otherwise the caller is
    /// queued until the pacing loop admits it, `ctx` is done, or the limiter
    /// stops. A full queue rejects the caller without waiting.
    pub async fn wait(&self, ctx: &WaitContext) -> Result<(), RateLimitError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(self.shared.stopped_error());
        }

        let admitted = {
            let mut state = self.shared.write_state();
            state.stats.record_request();
            let admitted = state.try_acquire(Instant::now());
            if !admitted {
                state.stats.record_throttled();
            }
            admitted
        };
        if admitted {
            return Ok(());
        }

        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let slot = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits) => return Err(self.reject()),
            Err(TryAcquireError::Closed) => return Err(self.shared.stopped_error()),
        };

        let (responder, response) = oneshot::channel();
        let request = PendingRequest {
            ctx: ctx.clone(),
            responder,
            enqueued_at: Instant::now(),
            _slot: slot,
        };

        match self.queue.try_send(request) {
            Ok(()) => trace!("Queued request for {}", self.service()),
            Err(TrySendError::Full(_)) => return Err(self.reject()),
            Err(TrySendError::Closed(_)) => return Err(self.shared.stopped_error()),
        }

        tokio::select! {
            biased;
            // A dropped request means the queue was torn down
            result = response => result.unwrap_or_else(|_| Err(self.shared.stopped_error())),
            err = ctx.done() => Err(err),
        }
    }

    fn reject(&self) -> RateLimitError {
        self.shared.write_state().stats.record_rejected();
        let capacity = self.shared.profile.queue_capacity.max(1);
        warn!(
            "Rate limit queue for {} is full ({} pending), rejecting request",
            self.service(),
            capacity
        );
        RateLimitError::QueueFull {
            service: self.service().to_string(),
            capacity,
        }
    }

    /// Authoritative quota resync from provider response headers
    pub fn update_limits(&self, limit: u64, remaining: u64, reset_at: Instant) {
        let mut state = self.shared.write_state();
        let adaptation = state.update_limits(limit, remaining, reset_at, Instant::now());
        let (multiplier, min_backoff) = (state.backoff_multiplier, state.min_backoff);
        drop(state);

        if let Some(adaptation) = adaptation {
            debug!(
                "{} limit changed to {}: {:?} (multiplier {:.2}, min backoff {:?})",
                self.service(),
                limit,
                adaptation,
                multiplier,
                min_backoff
            );
        }
    }

    /// Records a server-mandated pause; `Duration::ZERO` clears it
    pub fn set_retry_after(&self, duration: Duration) {
        self.shared
            .write_state()
            .set_retry_after(duration, Instant::now());
        if !duration.is_zero() {
            debug!("{} asked to retry after {:?}", self.service(), duration);
        }
    }

    /// Applies parsed provider feedback
    ///
    /// Quota is only resynced when limit, remaining and reset were all
    /// reported. A throttled response without any wait hint pauses for the
    /// profile's minimum backoff.
    pub fn apply_feedback(&self, feedback: &RateLimitFeedback) {
        if let Some((limit, remaining, reset_at)) = feedback.quota() {
            self.update_limits(limit, remaining, reset_at);
        }

        match feedback.retry_after {
            Some(retry_after) => self.set_retry_after(retry_after),
            None if feedback.throttled => {
                let pause = self.shared.read_state().min_backoff;
                self.set_retry_after(pause);
            }
            None => {}
        }
    }

    /// Parses a provider response's status and headers and applies them
    pub fn observe_response(&self, status: StatusCode, headers: &HeaderMap) -> RateLimitFeedback {
        let feedback = RateLimitFeedback::from_response(status, headers);
        self.apply_feedback(&feedback);
        feedback
    }

    /// Delay the limiter would currently impose on a denied request
    pub fn calculate_backoff(&self) -> Duration {
        self.shared.calculate_backoff()
    }

    pub fn stats(&self) -> LimiterStats {
        self.shared.read_state().stats.clone()
    }

    /// Recent provider quota reports, oldest first
    pub fn history(&self) -> Vec<QuotaSnapshot> {
        let state = self.shared.read_state();
        state.history.latest(state.history.len()).copied().collect()
    }

    pub fn current_status(&self) -> QuotaStatus {
        self.shared.read_state().status(Instant::now())
    }

    pub fn phase(&self) -> LimiterPhase {
        self.shared.read_state().phase(Instant::now())
    }

    pub fn report(&self) -> LimiterReport {
        let now = Instant::now();
        let state = self.shared.read_state();
        let status = state.status(now);

        LimiterReport {
            service: self.service().to_string(),
            phase: state.phase(now),
            limit: status.limit,
            remaining: status.remaining,
            resets_in: status.reset_at.saturating_duration_since(now),
            retry_after: status.retry_after,
            backoff_multiplier: state.backoff_multiplier,
            min_backoff: state.min_backoff,
            queue_capacity: self.shared.profile.queue_capacity,
            stats: state.stats.clone(),
        }
    }

    pub fn print_stats(&self) {
        println!("{}", self.report());
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Stops the pacing loop and resolves every pending request with
    /// [`RateLimitError::Stopped`]. Safe to call more than once, including
    /// concurrently: every call returns only after the pacing loop has exited.
    pub async fn stop(&self) {
        self.shared.shutdown.cancel();
        self.slots.close();

        let mut pacer = self.pacer.lock().await;
        if let Some(handle) = pacer.take() {
            if let Err(e) = handle.await {
                warn!("Pacing loop for {} ended abnormally: {}", self.service(), e);
            }
            debug!("Stopped rate limiter for {}", self.service());
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        // Lets the pacing loop and requeue tasks exit when stop() was never called
        self.shared.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn single_request_profile() -> ServiceProfile {
        ServiceProfile::github()
            .with_service("test")
            .with_initial_limit(1)
            .with_queue_capacity(4)
            .with_backoff(Duration::from_millis(10), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_overlapping_stops_both_wait_for_pacing_loop() {
        let limiter = RateLimiter::new(single_request_profile());
        limiter.wait(&WaitContext::background()).await.unwrap();

        // The pacing loop has not run yet on this single-threaded runtime, so
        // the waiter sits in the queue until the loop drains it on exit
        let ctx = WaitContext::background();
        let mut waiter = Box::pin(limiter.wait(&ctx));
        assert!((&mut waiter).now_or_never().is_none());

        let (_, resolved) = tokio::join!(limiter.stop(), async {
            limiter.stop().await;
            (&mut waiter).now_or_never()
        });

        assert!(matches!(resolved, Some(Err(RateLimitError::Stopped { .. }))));
        assert!(limiter.pacer.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_history_lists_reports_oldest_first() {
        let limiter = RateLimiter::new(single_request_profile());
        let reset_at = Instant::now() + Duration::from_secs(60);
        limiter.update_limits(100, 80, reset_at);
        limiter.update_limits(100, 5, reset_at);

        let history = limiter.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].remaining, 80);
        assert!(history[1].is_throttled());
        limiter.stop().await;
    }
}
