// Application state and the shared poll state guarded by a single lock.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ping_core::model::ProbeResponse;
use ping_core::status::{StatusTracker, StatusTransition, StatusValue};

use crate::monitor::Monitor;
use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub sequence: Arc<AtomicU64>,
    pub start_instant: Instant,
}

pub type SharedPollState = Arc<Mutex<PollState>>;

pub struct PendingCycle {
    pub cycle: u64,
    pub token: CancellationToken,
}

/// Session, tracker, and the outstanding cycle's token. Poll cycles and the
/// monitor mutate these under one lock; readers use the status channel.
pub struct PollState {
    pub session: Option<Session>,
    pub tracker: StatusTracker,
    pub pending: Option<PendingCycle>,
    pub generation: u64,
    next_cycle: u64,
    status_tx: watch::Sender<StatusValue>,
}

impl PollState {
    pub fn new(tracker: StatusTracker) -> (Self, watch::Receiver<StatusValue>) {
        let (status_tx, status_rx) = watch::channel(tracker.status().clone());
        let state = Self {
            session: None,
            tracker,
            pending: None,
            generation: 0,
            next_cycle: 0,
            status_tx,
        };
        (state, status_rx)
    }

    pub fn shared(tracker: StatusTracker) -> (SharedPollState, watch::Receiver<StatusValue>) {
        let (state, status_rx) = Self::new(tracker);
        (Arc::new(Mutex::new(state)), status_rx)
    }

    pub fn status(&self) -> &StatusValue {
        self.tracker.status()
    }

    /// Runs a tracker transition and publishes the new value if it is notify-worthy.
    pub fn transition(
        &mut self,
        apply: impl FnOnce(&mut StatusTracker) -> Option<StatusTransition>,
    ) -> Option<StatusTransition> {
        let transition = apply(&mut self.tracker)?;
        info!(
            from = ?transition.from,
            to = ?transition.to,
            label = %self.tracker.status().label(),
            "status transition"
        );
        self.status_tx.send_replace(self.tracker.status().clone());
        Some(transition)
    }

    /// Cancels the outstanding cycle, if any, and registers a new one.
    /// Returns `None` when `generation` belongs to a stopped poller.
    pub fn begin_cycle(&mut self, generation: u64) -> Option<(u64, CancellationToken)> {
        if generation != self.generation {
            return None;
        }
        self.cancel_pending();
        self.next_cycle = self.next_cycle.wrapping_add(1);
        let token = CancellationToken::new();
        self.pending = Some(PendingCycle {
            cycle: self.next_cycle,
            token: token.clone(),
        });
        Some((self.next_cycle, token))
    }

    /// Cancels the outstanding cycle. Its request may still be answered, so
    /// the session goes with it and the next cycle opens a fresh socket.
    pub fn cancel_pending(&mut self) {
        if let Some(previous) = self.pending.take() {
            previous.token.cancel();
            self.session = None;
            debug!(cycle = previous.cycle, "cancelled previous operation");
        }
    }

    fn finish_cycle(&mut self, cycle: u64) {
        if self.pending.as_ref().map(|p| p.cycle) == Some(cycle) {
            self.pending = None;
        }
    }

    pub fn install_session(&mut self, token: &CancellationToken, session: Session) -> bool {
        if token.is_cancelled() {
            return false;
        }
        if self.session.is_none() {
            self.session = Some(session);
        }
        true
    }

    pub fn report_success(
        &mut self,
        cycle: u64,
        token: &CancellationToken,
        response: ProbeResponse,
    ) -> Option<StatusTransition> {
        if token.is_cancelled() {
            debug!(cycle, "dropping superseded ping result");
            return None;
        }
        self.finish_cycle(cycle);
        self.transition(|tracker| tracker.apply_success(response))
    }

    pub fn report_failure(
        &mut self,
        cycle: u64,
        token: &CancellationToken,
        failed: Option<&Session>,
    ) -> Option<StatusTransition> {
        if token.is_cancelled() {
            debug!(cycle, "dropping superseded ping failure");
            return None;
        }
        self.finish_cycle(cycle);
        if let Some(failed) = failed {
            if self
                .session
                .as_ref()
                .map(|current| current.same_socket(failed))
                .unwrap_or(false)
            {
                self.session = None;
            }
        }
        self.transition(StatusTracker::apply_failure)
    }
}
