// Monitor settings, validation, and keyed change subscriptions.
// Invariants: the store only ever holds validated settings; a dropped Subscription is released.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::constants::{
    DEFAULT_MUMBLE_HOST, DEFAULT_MUMBLE_PORT, DEFAULT_REFRESH_INTERVAL_SECS,
    MAX_REFRESH_INTERVAL_SECS, MIN_REFRESH_INTERVAL_SECS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("mumble host must not be empty")]
    InvalidHost,
    #[error("mumble port must be between 1 and 65535")]
    InvalidPort,
    #[error("refresh interval {0}s is outside 1..=3600")]
    InvalidInterval(u64),
    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingKey {
    #[serde(rename = "mumble-host")]
    Host,
    #[serde(rename = "mumble-port")]
    Port,
    #[serde(rename = "refresh-timeout")]
    RefreshInterval,
    Enabled,
    Debug,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Host,
        SettingKey::Port,
        SettingKey::RefreshInterval,
        SettingKey::Enabled,
        SettingKey::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Host => "mumble-host",
            SettingKey::Port => "mumble-port",
            SettingKey::RefreshInterval => "refresh-timeout",
            SettingKey::Enabled => "enabled",
            SettingKey::Debug => "debug",
        }
    }

    /// Keys whose change requires the poller to be rebuilt.
    pub fn affects_polling(&self) -> bool {
        !matches!(self, SettingKey::Debug)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub refresh_interval_secs: u64,
    pub enabled: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_MUMBLE_HOST.to_string(),
            port: DEFAULT_MUMBLE_PORT,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            enabled: true,
            debug: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let defaults = Settings::default();
        let settings = Settings {
            host: lookup("MUMBLE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "MUMBLE_PORT", defaults.port)?,
            refresh_interval_secs: parse_var(
                &lookup,
                "MUMBLE_REFRESH_SECS",
                defaults.refresh_interval_secs,
            )?,
            enabled: parse_flag(&lookup, "MUMBLE_ENABLED", defaults.enabled)?,
            debug: parse_flag(&lookup, "MUMBLE_DEBUG", defaults.debug)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidHost);
        }
        if self.port == 0 {
            return Err(SettingsError::InvalidPort);
        }
        if !(MIN_REFRESH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS)
            .contains(&self.refresh_interval_secs)
        {
            return Err(SettingsError::InvalidInterval(self.refresh_interval_secs));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn changed_keys(&self, next: &Settings) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|key| match key {
                SettingKey::Host => self.host != next.host,
                SettingKey::Port => self.port != next.port,
                SettingKey::RefreshInterval => {
                    self.refresh_interval_secs != next.refresh_interval_secs
                }
                SettingKey::Enabled => self.enabled != next.enabled,
                SettingKey::Debug => self.debug != next.debug,
            })
            .collect()
    }

    pub fn patched(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            host: patch
                .host
                .as_ref()
                .map(|host| host.trim().to_string())
                .unwrap_or_else(|| self.host.clone()),
            port: patch.port.unwrap_or(self.port),
            refresh_interval_secs: patch
                .refresh_interval_secs
                .unwrap_or(self.refresh_interval_secs),
            enabled: patch.enabled.unwrap_or(self.enabled),
            debug: patch.debug.unwrap_or(self.debug),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub refresh_interval_secs: Option<u64>,
    pub enabled: Option<bool>,
    pub debug: Option<bool>,
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, SettingsError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| SettingsError::Env { var, value }),
        None => Ok(default),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, SettingsError> {
    match lookup(var) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(SettingsError::Env { var, value }),
        },
        None => Ok(default),
    }
}

#[derive(Clone, Debug)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Applies `patch` atomically. Nothing is stored if any field is invalid.
    pub fn update(&self, patch: &SettingsPatch) -> Result<Settings, SettingsError> {
        let next = self.get().patched(patch);
        next.validate()?;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        Ok(next)
    }

    pub fn set_enabled(&self, enabled: bool) -> Settings {
        self.tx.send_if_modified(|current| {
            if current.enabled == enabled {
                return false;
            }
            current.enabled = enabled;
            true
        });
        self.get()
    }

    pub fn subscribe(&self, keys: &[SettingKey]) -> Subscription {
        let rx = self.tx.subscribe();
        let seen = rx.borrow().clone();
        Subscription {
            rx,
            keys: keys.to_vec(),
            seen,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live registration for changes to a set of keys. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Settings>,
    keys: Vec<SettingKey>,
    seen: Settings,
}

impl Subscription {
    /// Waits for the next change touching a subscribed key and returns those
    /// keys. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Vec<SettingKey>> {
        loop {
            self.rx.changed().await.ok()?;
            let next = self.rx.borrow_and_update().clone();
            let keys: Vec<SettingKey> = self
                .seen
                .changed_keys(&next)
                .into_iter()
                .filter(|key| self.keys.contains(key))
                .collect();
            self.seen = next;
            if !keys.is_empty() {
                return Some(keys);
            }
        }
    }

    pub fn current(&self) -> &Settings {
        &self.seen
    }
}
