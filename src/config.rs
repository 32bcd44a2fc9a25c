//! Monitor configuration
//!
//! Configuration is validated here at the boundary; the monitoring core only
//! ever sees values that passed `validate()`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default charge threshold in percent
const DEFAULT_THRESHOLD_PERCENT: u8 = 80;

/// Default polling interval in seconds
const DEFAULT_POLL_INTERVAL: u64 = 30;

/// Default snooze duration in seconds
const DEFAULT_SNOOZE_SECONDS: u64 = 60;

/// Default floor for the adaptive scheduler in seconds
const DEFAULT_MIN_POLL_INTERVAL: u64 = 5;

/// Default width of the near-threshold fast-polling band in percent
const DEFAULT_NEAR_THRESHOLD_BAND: f32 = 5.0;

/// Default percentage drop tolerated before an open cycle is closed as noise
const DEFAULT_DEBOUNCE_MARGIN: f32 = 2.0;

/// Cycles shorter than this are considered plug-bounce artifacts
const DEFAULT_MIN_CYCLE_SECONDS: i64 = 30;

/// Per-device configuration override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Alerting priority; higher wins
    pub priority: i32,

    /// Threshold override, falls back to the global threshold when absent
    pub threshold_percent: Option<u8>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            threshold_percent: None,
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Charge percentage at which the stop-charging alert fires (1-100)
    pub threshold_percent: u8,

    /// Base polling interval in seconds
    pub poll_interval_seconds: u64,

    /// How long a snoozed alert stays quiet, in seconds
    pub snooze_seconds: u64,

    /// Floor for the adaptive scheduler, in seconds
    pub min_poll_interval_seconds: u64,

    /// Width of the near-threshold fast-polling band, in percentage points
    pub near_threshold_band: f32,

    /// Percentage drop tolerated before an open cycle is closed as noise
    pub debounce_margin: f32,

    /// Minimum duration for a cycle to be recorded, in seconds
    pub min_cycle_seconds: i64,

    /// Per-device overrides keyed by device id
    pub devices: HashMap<String, DeviceConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL,
            snooze_seconds: DEFAULT_SNOOZE_SECONDS,
            min_poll_interval_seconds: DEFAULT_MIN_POLL_INTERVAL,
            near_threshold_band: DEFAULT_NEAR_THRESHOLD_BAND,
            debounce_margin: DEFAULT_DEBOUNCE_MARGIN,
            min_cycle_seconds: DEFAULT_MIN_CYCLE_SECONDS,
            devices: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Reject out-of-range values before they reach the core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold_percent < 1 || self.threshold_percent > 100 {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold_percent));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::NonPositiveInterval);
        }
        if self.min_poll_interval_seconds > self.poll_interval_seconds {
            return Err(ConfigError::MinIntervalAboveBase);
        }
        if self.debounce_margin < 0.0 {
            return Err(ConfigError::NegativeDebounceMargin(self.debounce_margin));
        }
        for (device_id, device) in &self.devices {
            if let Some(threshold) = device.threshold_percent {
                if threshold < 1 || threshold > 100 {
                    log::warn!("device {} has out-of-range threshold {}", device_id, threshold);
                    return Err(ConfigError::ThresholdOutOfRange(threshold));
                }
            }
        }
        Ok(())
    }

    /// Effective threshold for a device, honoring any per-device override.
    pub fn threshold_for(&self, device_id: &str) -> u8 {
        self.devices
            .get(device_id)
            .and_then(|d| d.threshold_percent)
            .unwrap_or(self.threshold_percent)
    }

    /// Alerting priority for a device, defaulting to 0.
    pub fn priority_for(&self, device_id: &str) -> i32 {
        self.devices.get(device_id).map(|d| d.priority).unwrap_or(0)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval_seconds)
    }

    pub fn snooze_duration(&self) -> Duration {
        Duration::from_secs(self.snooze_seconds)
    }

    /// Load configuration from a JSON file, validating before returning.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default settings path, falling back to defaults when
    /// no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_settings_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Save(e.to_string()))?;
        }
        let raw =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Save(e.to_string()))?;
        fs::write(path, raw).map_err(|e| ConfigError::Save(e.to_string()))
    }

    /// Save to the default settings path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&default_settings_path())
    }
}

/// Get the default settings path
fn default_settings_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|config_dir| config_dir.join("chargeguard").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("settings.json")) // Fallback to current directory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_percent, 80);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.snooze_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = MonitorConfig {
            threshold_percent: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(0))
        ));

        let config = MonitorConfig {
            threshold_percent: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MonitorConfig {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveInterval)
        ));
    }

    #[test]
    fn test_min_interval_above_base_rejected() {
        let config = MonitorConfig {
            poll_interval_seconds: 10,
            min_poll_interval_seconds: 20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinIntervalAboveBase)
        ));
    }

    #[test]
    fn test_per_device_override() {
        let mut config = MonitorConfig::default();
        config.devices.insert(
            "phone-01".to_string(),
            DeviceConfig {
                priority: 10,
                threshold_percent: Some(90),
            },
        );

        assert_eq!(config.threshold_for("phone-01"), 90);
        assert_eq!(config.threshold_for("laptop"), 80);
        assert_eq!(config.priority_for("phone-01"), 10);
        assert_eq!(config.priority_for("laptop"), 0);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut config = MonitorConfig::default();
        config.threshold_percent = 85;
        config.devices.insert(
            "phone-01".to_string(),
            DeviceConfig {
                priority: 5,
                threshold_percent: Some(90),
            },
        );
        config.save_to(&path).unwrap();

        let loaded = MonitorConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MonitorConfig::load_from(&path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_per_device_threshold_validated() {
        let mut config = MonitorConfig::default();
        config.devices.insert(
            "phone-01".to_string(),
            DeviceConfig {
                priority: 0,
                threshold_percent: Some(0),
            },
        );
        assert!(config.validate().is_err());
    }
}
