use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::sync::{lock_or_recover, read_or_recover, write_or_recover};

pub const SETTINGS_ENV_VAR: &str = "SUBTICK_SETTINGS";

const SETTINGS_LOCK: &str = "settings";
const OBSERVERS_LOCK: &str = "settings_observers";

/// Runtime switches. Every field defaults to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Settings {
    pub soft_toggle: bool,
    pub late_cutoff: bool,
    pub actual_delta: bool,
    #[serde(rename = "right-click")]
    pub right_click_p2_jump: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings at {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Path named by `SUBTICK_SETTINGS`, if set.
pub fn resolve_settings_path() -> Result<Option<PathBuf>, ConfigError> {
    match env::var(SETTINGS_ENV_VAR) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::EnvVar {
            var: SETTINGS_ENV_VAR,
            source,
        }),
    }
}

impl Settings {
    /// Defaults when `SUBTICK_SETTINGS` is unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match resolve_settings_path()? {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            let location = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            ConfigError::Parse {
                location,
                source: error.into_inner(),
            }
        })
    }

    pub fn apply(&mut self, change: SettingChange) -> bool {
        let slot = match change {
            SettingChange::SoftToggle(_) => &mut self.soft_toggle,
            SettingChange::LateCutoff(_) => &mut self.late_cutoff,
            SettingChange::ActualDelta(_) => &mut self.actual_delta,
            SettingChange::RightClickP2Jump(_) => &mut self.right_click_p2_jump,
        };
        let value = change.value();
        let changed = *slot != value;
        *slot = value;
        changed
    }

    /// Indicator text for the end-of-run display, or `None` when nothing
    /// non-default is active.
    pub fn indicator_label(&self) -> Option<&'static str> {
        match (self.soft_toggle, self.actual_delta) {
            (true, false) => None,
            (true, true) => Some("PB"),
            (false, true) => Some("CBF+PB"),
            (false, false) => Some("CBF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    SoftToggle(bool),
    LateCutoff(bool),
    ActualDelta(bool),
    RightClickP2Jump(bool),
}

impl SettingChange {
    pub fn value(self) -> bool {
        match self {
            SettingChange::SoftToggle(value)
            | SettingChange::LateCutoff(value)
            | SettingChange::ActualDelta(value)
            | SettingChange::RightClickP2Jump(value) => value,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SettingChange::SoftToggle(_) => "soft-toggle",
            SettingChange::LateCutoff(_) => "late-cutoff",
            SettingChange::ActualDelta(_) => "actual-delta",
            SettingChange::RightClickP2Jump(_) => "right-click",
        }
    }
}

/// Receives setting changes on whichever thread made them.
pub trait SettingsObserver: Send + Sync {
    fn on_setting_changed(&self, change: SettingChange);
}

impl<F> SettingsObserver for F
where
    F: Fn(SettingChange) + Send + Sync,
{
    fn on_setting_changed(&self, change: SettingChange) {
        self(change)
    }
}

/// Forwards changes into a channel for a thread that applies them later.
pub struct ChannelObserver {
    sender: Mutex<Sender<SettingChange>>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<SettingChange>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl SettingsObserver for ChannelObserver {
    fn on_setting_changed(&self, change: SettingChange) {
        // A closed receiver means the pipeline is gone; nothing left to notify.
        let _ = lock_or_recover(&self.sender, OBSERVERS_LOCK).send(change);
    }
}

#[derive(Default)]
struct SettingsShared {
    current: RwLock<Settings>,
    observers: RwLock<Vec<Arc<dyn SettingsObserver>>>,
}

/// Shared, observable settings. Clones see the same values and observers.
#[derive(Clone, Default)]
pub struct SettingsStore {
    shared: Arc<SettingsShared>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            shared: Arc::new(SettingsShared {
                current: RwLock::new(settings),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn current(&self) -> Settings {
        *read_or_recover(&self.shared.current, SETTINGS_LOCK)
    }

    pub fn subscribe(&self, observer: Arc<dyn SettingsObserver>) {
        write_or_recover(&self.shared.observers, OBSERVERS_LOCK).push(observer);
    }

    /// Stores the change and notifies observers when the value differs.
    pub fn set(&self, change: SettingChange) -> bool {
        let changed = write_or_recover(&self.shared.current, SETTINGS_LOCK).apply(change);
        if !changed {
            return false;
        }
        debug!(key = change.key(), value = change.value(), "setting_changed");
        let observers = read_or_recover(&self.shared.observers, OBSERVERS_LOCK).clone();
        for observer in observers {
            observer.on_setting_changed(change);
        }
        true
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn missing_keys_default_to_off() {
        let settings = Settings::from_json_str(r#"{ "late-cutoff": true }"#).expect("parse");
        assert_eq!(
            settings,
            Settings {
                late_cutoff: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn loads_every_key_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "soft-toggle": true, "late-cutoff": true, "actual-delta": true, "right-click": true }}"#
        )
        .expect("write settings");

        let settings = Settings::load_from_path(file.path()).expect("load");
        assert!(settings.soft_toggle);
        assert!(settings.late_cutoff);
        assert!(settings.actual_delta);
        assert!(settings.right_click_p2_jump);
    }

    #[test]
    fn parse_error_names_the_offending_field() {
        let error = Settings::from_json_str(r#"{ "actual-delta": "yes" }"#).expect_err("bad type");
        match error {
            ConfigError::Parse { location, .. } => assert_eq!(location, "actual-delta"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_json_str(r#"{ "click-between-steps": true }"#).is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = Settings::load_from_path(&dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn indicator_label_tracks_active_features() {
        let mut settings = Settings::default();
        assert_eq!(settings.indicator_label(), Some("CBF"));
        settings.actual_delta = true;
        assert_eq!(settings.indicator_label(), Some("CBF+PB"));
        settings.soft_toggle = true;
        assert_eq!(settings.indicator_label(), Some("PB"));
        settings.actual_delta = false;
        assert_eq!(settings.indicator_label(), None);
    }

    #[test]
    fn observers_only_hear_real_changes() {
        let store = SettingsStore::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.subscribe(Arc::new(move |_change: SettingChange| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(store.set(SettingChange::LateCutoff(true)));
        assert!(!store.set(SettingChange::LateCutoff(true)));
        assert!(store.set(SettingChange::LateCutoff(false)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn channel_observer_forwards_changes_across_threads() {
        let store = SettingsStore::default();
        let (sender, receiver) = mpsc::channel();
        store.subscribe(Arc::new(ChannelObserver::new(sender)));

        let remote = store.clone();
        std::thread::spawn(move || {
            remote.set(SettingChange::ActualDelta(true));
        })
        .join()
        .expect("setter thread");

        assert_eq!(
            receiver.try_recv().expect("change forwarded"),
            SettingChange::ActualDelta(true)
        );
        assert!(store.current().actual_delta);
    }
}
