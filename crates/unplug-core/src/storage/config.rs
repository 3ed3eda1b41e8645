//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Reminder cadence, budget and escalation policy
//! - Timer re-evaluation cadence and background mode
//! - Battery sampling and tier thresholds
//!
//! Configuration is stored at `~/.config/unplug/config.toml`. The core only
//! ever reads it; changes flow in through `FocusController::apply_config`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::notify::HapticPolicy;

/// Reminder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Period of the reminder loop while the phone is in use.
    #[serde(default = "default_frequency")]
    pub notification_frequency_secs: u64,
    /// Floor between two delivered reminders, whatever the loop does.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    #[serde(default = "default_max_notifications")]
    pub max_notifications: u32,
    #[serde(default)]
    pub aggressive_mode: bool,
    #[serde(default = "default_true")]
    pub haptic_enabled: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_true")]
    pub background_mode_enabled: bool,
    #[serde(default)]
    pub haptic: HapticPolicy,
}

/// Countdown re-evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Display refresh cadence; independent of the reminder cadence.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Base period of the background re-evaluation, before battery widening.
    #[serde(default = "default_background_sync_secs")]
    pub background_sync_secs: u64,
}

/// Battery sampling and tier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// `Normal -> Saving` below this level.
    #[serde(default = "default_saving_below")]
    pub saving_below: f32,
    /// `Saving -> Critical` below this level.
    #[serde(default = "default_critical_below")]
    pub critical_below: f32,
    /// `Saving -> Normal` only above this level.
    #[serde(default = "default_saving_recover_above")]
    pub saving_recover_above: f32,
    /// `Critical -> Saving` only above this level.
    #[serde(default = "default_critical_recover_above")]
    pub critical_recover_above: f32,
    #[serde(default = "default_saving_multiplier")]
    pub saving_multiplier: f64,
    #[serde(default = "default_critical_multiplier")]
    pub critical_multiplier: f64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/unplug/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
}

// Default functions
fn default_frequency() -> u64 {
    30
}
fn default_min_interval() -> u64 {
    10
}
fn default_max_notifications() -> u32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_background_sync_secs() -> u64 {
    60
}
fn default_sample_interval_secs() -> u64 {
    30
}
fn default_window_size() -> usize {
    20
}
fn default_saving_below() -> f32 {
    20.0
}
fn default_critical_below() -> f32 {
    10.0
}
fn default_saving_recover_above() -> f32 {
    25.0
}
fn default_critical_recover_above() -> f32 {
    15.0
}
fn default_saving_multiplier() -> f64 {
    2.0
}
fn default_critical_multiplier() -> f64 {
    4.0
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            notification_frequency_secs: default_frequency(),
            min_interval_secs: default_min_interval(),
            max_notifications: default_max_notifications(),
            aggressive_mode: false,
            haptic_enabled: true,
            sound_enabled: true,
            background_mode_enabled: true,
            haptic: HapticPolicy::default(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            background_sync_secs: default_background_sync_secs(),
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            window_size: default_window_size(),
            saving_below: default_saving_below(),
            critical_below: default_critical_below(),
            saving_recover_above: default_saving_recover_above(),
            critical_recover_above: default_critical_recover_above(),
            saving_multiplier: default_saving_multiplier(),
            critical_multiplier: default_critical_multiplier(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/unplug"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or create the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation, or if the default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, in memory only. The result must still
    /// pass [`Config::validate`]; on error `self` is left untouched.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        let n = &self.notifications;
        if n.notification_frequency_secs == 0 {
            return invalid("notifications.notification_frequency_secs", "must be at least 1");
        }
        if n.max_notifications == 0 {
            return invalid("notifications.max_notifications", "must be at least 1");
        }
        if n.haptic.medium_after > n.haptic.heavy_after {
            return invalid(
                "notifications.haptic.medium_after",
                "must not exceed haptic.heavy_after",
            );
        }
        if self.timer.tick_interval_ms == 0 {
            return invalid("timer.tick_interval_ms", "must be at least 1");
        }
        if self.timer.background_sync_secs == 0 {
            return invalid("timer.background_sync_secs", "must be at least 1");
        }

        let b = &self.battery;
        if b.sample_interval_secs == 0 {
            return invalid("battery.sample_interval_secs", "must be at least 1");
        }
        if b.window_size < 2 {
            return invalid("battery.window_size", "must hold at least 2 samples");
        }
        if !(b.critical_below < b.saving_below) {
            return invalid("battery.critical_below", "must be below battery.saving_below");
        }
        if !(b.saving_recover_above > b.saving_below) {
            return invalid(
                "battery.saving_recover_above",
                "must be above battery.saving_below",
            );
        }
        if !(b.critical_recover_above > b.critical_below) {
            return invalid(
                "battery.critical_recover_above",
                "must be above battery.critical_below",
            );
        }
        if b.saving_multiplier < 1.0 || b.critical_multiplier < 1.0 {
            return invalid("battery.saving_multiplier", "tier multipliers must be >= 1.0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[notifications]\nnotification_frequency_secs = 45\naggressive_mode = true\n",
        )
        .unwrap();
        assert_eq!(parsed.notifications.notification_frequency_secs, 45);
        assert!(parsed.notifications.aggressive_mode);
        assert_eq!(parsed.notifications.max_notifications, 10);
        assert_eq!(parsed.battery.window_size, 20);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(
            cfg.get("notifications.sound_enabled").as_deref(),
            Some("true")
        );
        assert_eq!(cfg.get("timer.tick_interval_ms").as_deref(), Some("100"));
        assert_eq!(
            cfg.get("notifications.haptic.heavy_after").as_deref(),
            Some("6")
        );
        assert!(cfg.get("notifications.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("notifications.aggressive_mode", "true").unwrap();
        cfg.set("notifications.max_notifications", "4").unwrap();
        cfg.set("battery.saving_below", "22.5").unwrap();
        assert!(cfg.notifications.aggressive_mode);
        assert_eq!(cfg.notifications.max_notifications, 4);
        assert_eq!(cfg.battery.saving_below, 22.5);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("notifications.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("notifications.sound_enabled", "loud"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn set_rejects_values_that_fail_validation() {
        let mut cfg = Config::default();
        let before = cfg.clone();
        assert!(cfg.set("notifications.notification_frequency_secs", "0").is_err());
        assert!(cfg.set("battery.saving_recover_above", "15").is_err());
        assert_eq!(cfg, before);
    }

    #[test]
    fn validate_rejects_inverted_haptic_thresholds() {
        let mut cfg = Config::default();
        cfg.notifications.haptic.medium_after = 9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("notifications.min_interval_secs", "20").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn load_from_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "notifications = 7").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
