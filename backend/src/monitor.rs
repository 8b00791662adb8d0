// Coordinates the poller with settings changes and the enable/disable toggle.
// Invariants: the poller runs iff settings are enabled; teardown releases the settings subscription.

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use ping_core::status::{StatusTracker, StatusValue};

use crate::app::{PollState, SharedPollState};
use crate::logging::LogControl;
use crate::poller::{Poller, PollerConfig};
use crate::settings::{SettingKey, SettingsStore, Subscription};

pub struct Monitor {
    settings: SettingsStore,
    state: SharedPollState,
    status_rx: watch::Receiver<StatusValue>,
    poller: Mutex<Poller>,
    log_control: Option<LogControl>,
    settings_task: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(settings: SettingsStore, log_control: Option<LogControl>) -> Arc<Self> {
        let tracker = StatusTracker::new(settings.get().enabled);
        let (state, status_rx) = PollState::shared(tracker);
        Arc::new(Self {
            settings,
            poller: Mutex::new(Poller::new(state.clone())),
            state,
            status_rx,
            log_control,
            settings_task: Mutex::new(None),
        })
    }

    /// Starts polling if enabled and begins following settings changes.
    pub async fn start(self: &Arc<Self>) {
        let subscription = self.settings.subscribe(&SettingKey::ALL);
        let settings = subscription.current().clone();
        if settings.enabled {
            self.poller.lock().await.start(PollerConfig::from(&settings)).await;
        } else {
            info!("monitor starting disabled");
        }
        let task = tokio::spawn(settings_task(Arc::downgrade(self), subscription));
        if let Some(previous) = self.settings_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Flips `enabled` and applies it immediately. Returns the new flag.
    pub async fn toggle_enable_disable(&self) -> bool {
        let enabled = !self.settings.get().enabled;
        info!(
            "setting status of indicator to {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.settings.set_enabled(enabled);
        self.reconcile().await;
        enabled
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.settings_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.poller.lock().await.stop().await;
        info!("monitor shut down");
    }

    pub fn status(&self) -> StatusValue {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusValue> {
        self.status_rx.clone()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_running()
    }

    /// Supersedes any outstanding probe with a fresh one. No-op when stopped.
    pub async fn probe_now(&self) -> bool {
        self.poller.lock().await.trigger_cycle().await.is_some()
    }

    /// Brings the poller in line with the stored settings. The store is read
    /// under the poller lock so a concurrent toggle is never undone.
    async fn reconcile(&self) {
        let mut poller = self.poller.lock().await;
        let settings = self.settings.get();
        if !settings.enabled {
            poller.stop().await;
            self.state.lock().await.transition(StatusTracker::disable);
            return;
        }
        let config = PollerConfig::from(&settings);
        if poller.config() == Some(&config) {
            return;
        }
        poller.stop().await;
        self.state.lock().await.transition(StatusTracker::set_waiting);
        poller.start(config).await;
    }

    fn apply_debug(&self, enabled: bool) {
        info!(debug = enabled, "changed debug mode setting");
        if let Some(log_control) = &self.log_control {
            log_control.set_debug(enabled);
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(task) = self.settings_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn settings_task(weak: Weak<Monitor>, mut subscription: Subscription) {
    while let Some(keys) = subscription.changed().await {
        let Some(monitor) = weak.upgrade() else {
            break;
        };
        for key in &keys {
            info!(key = key.as_str(), "setting changed");
        }
        if keys.contains(&SettingKey::Debug) {
            monitor.apply_debug(subscription.current().debug);
        }
        if keys.iter().any(SettingKey::affects_polling) {
            monitor.reconcile().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn local_settings(enabled: bool) -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            port: 9,
            refresh_interval_secs: 3600,
            enabled,
            debug: false,
        }
    }

    #[tokio::test]
    async fn reconcile_reads_store_under_poller_lock() {
        let store = SettingsStore::new(local_settings(true));
        let monitor = Monitor::new(store.clone(), None);
        monitor
            .poller
            .lock()
            .await
            .start(PollerConfig::from(&store.get()))
            .await;

        // Disabled behind the monitor's back, as a concurrent toggle would.
        store.set_enabled(false);
        monitor.reconcile().await;

        assert!(!monitor.is_polling().await);
        assert_eq!(monitor.status(), StatusValue::Disabled);
    }

    #[tokio::test]
    async fn reconcile_is_noop_for_running_config() {
        let store = SettingsStore::new(local_settings(true));
        let monitor = Monitor::new(store.clone(), None);
        monitor
            .poller
            .lock()
            .await
            .start(PollerConfig::from(&store.get()))
            .await;
        let generation = monitor.state.lock().await.generation;

        monitor.reconcile().await;

        assert_eq!(monitor.state.lock().await.generation, generation);
        assert!(monitor.is_polling().await);
        monitor.shutdown().await;
    }
}
