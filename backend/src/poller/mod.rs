// Probe scheduling: one repeating timer, at most one outstanding cycle.
// Invariants: a new cycle cancels the previous one first; cancelled cycles never touch the tracker.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::SharedPollState;
use crate::session::{ConnectError, Endpoint, ProbeError, Session};
use crate::settings::Settings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerConfig {
    pub endpoint: Endpoint,
    pub interval: Duration,
    pub enabled: bool,
}

impl From<&Settings> for PollerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            endpoint: Endpoint::new(settings.host.clone(), settings.port),
            interval: settings.refresh_interval(),
            enabled: settings.enabled,
        }
    }
}

struct Running {
    config: PollerConfig,
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct Poller {
    state: SharedPollState,
    running: Option<Running>,
}

impl Poller {
    pub fn new(state: SharedPollState) -> Self {
        Self {
            state,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn config(&self) -> Option<&PollerConfig> {
        self.running.as_ref().map(|running| &running.config)
    }

    /// Probes immediately, then every `config.interval`. A running poller is
    /// stopped first.
    pub async fn start(&mut self, config: PollerConfig) {
        if self.running.is_some() {
            self.stop().await;
        }
        let generation = {
            let mut state = self.state.lock().await;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };
        info!(
            endpoint = %config.endpoint,
            interval_secs = config.interval.as_secs(),
            "poller started"
        );
        let timer = tokio::spawn(timer_loop(
            self.state.clone(),
            config.endpoint.clone(),
            config.interval,
            generation,
        ));
        self.running = Some(Running {
            config,
            generation,
            timer,
        });
    }

    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.timer.abort();
        let mut state = self.state.lock().await;
        state.generation = state.generation.wrapping_add(1);
        state.cancel_pending();
        state.session = None;
        info!(endpoint = %running.config.endpoint, "poller stopped");
    }

    pub async fn restart(&mut self, config: PollerConfig) {
        self.stop().await;
        self.start(config).await;
    }

    /// Starts a cycle outside the timer cadence, superseding any outstanding one.
    pub async fn trigger_cycle(&self) -> Option<JoinHandle<()>> {
        let running = self.running.as_ref()?;
        spawn_cycle(&self.state, &running.config.endpoint, running.generation).await
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.timer.abort();
            if let Ok(mut state) = self.state.try_lock() {
                state.generation = state.generation.wrapping_add(1);
                state.cancel_pending();
                state.session = None;
            }
        }
    }
}

async fn timer_loop(state: SharedPollState, endpoint: Endpoint, period: Duration, generation: u64) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if spawn_cycle(&state, &endpoint, generation).await.is_none() {
            break;
        }
    }
}

async fn spawn_cycle(
    state: &SharedPollState,
    endpoint: &Endpoint,
    generation: u64,
) -> Option<JoinHandle<()>> {
    let (cycle, token) = state.lock().await.begin_cycle(generation)?;
    Some(tokio::spawn(run_cycle(
        state.clone(),
        endpoint.clone(),
        cycle,
        token,
    )))
}

async fn run_cycle(state: SharedPollState, endpoint: Endpoint, cycle: u64, token: CancellationToken) {
    let existing = state.lock().await.session.clone();
    let session = match existing {
        Some(session) => session,
        None => {
            debug!(cycle, %endpoint, "connecting");
            match Session::open(&endpoint, &token).await {
                Ok(session) => {
                    if !state.lock().await.install_session(&token, session.clone()) {
                        debug!(cycle, "connect superseded");
                        return;
                    }
                    session
                }
                Err(ConnectError::Cancelled) => {
                    debug!(cycle, "connect cancelled");
                    return;
                }
                Err(err) => {
                    warn!(cycle, error = %err, "failed to open ping session");
                    state.lock().await.report_failure(cycle, &token, None);
                    return;
                }
            }
        }
    };

    debug!(cycle, peer = %session.peer(), "sending ping");
    let outcome = session.probe(&token).await;
    let mut state = state.lock().await;
    match outcome {
        Ok(response) => {
            debug!(
                cycle,
                users = response.users,
                max_users = response.max_users,
                version = %response.version,
                "ping response"
            );
            state.report_success(cycle, &token, response);
        }
        Err(ProbeError::Cancelled) => {
            debug!(cycle, "ping cancelled");
        }
        Err(err) => {
            warn!(cycle, peer = %session.peer(), error = %err, "ping failed");
            state.report_failure(cycle, &token, Some(&session));
        }
    }
}
