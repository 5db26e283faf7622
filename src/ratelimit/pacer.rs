//! Background pacing loop that releases queued requests
//!
//! Runs on a fixed tick. Each tick drains the queue in arrival order until the
//! first request that cannot be admitted; that request is parked in a requeue
//! task for the current backoff and then put back on the queue.

use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::config::PACING_TICK;
use super::limiter::{PendingRequest, Shared};

/// How a parked request's sleep ended
enum Wakeup {
    Retry,
    Abandoned,
    Shutdown,
}

pub(crate) struct Pacer {
    shared: Arc<Shared>,
    receiver: mpsc::Receiver<PendingRequest>,
    requeue: mpsc::Sender<PendingRequest>,
}

impl Pacer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        receiver: mpsc::Receiver<PendingRequest>,
        requeue: mpsc::Sender<PendingRequest>,
    ) -> Self {
        Self {
            shared,
            receiver,
            requeue,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(PACING_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.shared.shutdown.cancelled() => break,
                _ = ticker.tick() => self.drain_queue(),
                Some(request) = self.receiver.recv() => {
                    self.dispatch(request);
                }
            }
        }

        self.close_queue().await;
    }

    fn drain_queue(&mut self) {
        while let Ok(request) = self.receiver.try_recv() {
            if !self.dispatch(request) {
                break;
            }
        }
    }

    /// Admits, drops or parks one request. Returns false when it was parked.
    fn dispatch(&self, request: PendingRequest) -> bool {
        if request.is_abandoned() {
            trace!("Dropping abandoned request for {}", self.shared.profile.service);
            return true;
        }

        if self.shared.try_admit(&request) {
            request.resolve(Ok(()));
            return true;
        }

        self.reschedule(request);
        false
    }

    fn reschedule(&self, mut request: PendingRequest) {
        let backoff = self.shared.calculate_backoff();
        let shared = Arc::clone(&self.shared);
        let requeue = self.requeue.clone();

        trace!(
            "Parking request for {} for {:?}",
            shared.profile.service,
            backoff
        );

        tokio::spawn(async move {
            let wakeup = tokio::select! {
                () = shared.shutdown.cancelled() => Wakeup::Shutdown,
                () = request.abandoned() => Wakeup::Abandoned,
                () = tokio::time::sleep(backoff) => Wakeup::Retry,
            };

            match wakeup {
                Wakeup::Abandoned => return,
                Wakeup::Shutdown => {
                    request.resolve(Err(shared.stopped_error()));
                    return;
                }
                Wakeup::Retry => {}
            }

            let permit = tokio::select! {
                () = shared.shutdown.cancelled() => None,
                permit = requeue.reserve() => permit.ok(),
            };

            match permit {
                Some(permit) => permit.send(request),
                None => request.resolve(Err(shared.stopped_error())),
            }
        });
    }

    /// Resolves everything still queued with a stopped error
    async fn close_queue(mut self) {
        self.receiver.close();

        let mut stopped = 0usize;
        while let Some(request) = self.receiver.recv().await {
            request.resolve(Err(self.shared.stopped_error()));
            stopped += 1;
        }

        if stopped > 0 {
            debug!(
                "Released {} pending requests for {} on shutdown",
                stopped, self.shared.profile.service
            );
        }
    }
}
