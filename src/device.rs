//! Device identity and sample types
//!
//! A `Sample` is a single immutable battery reading; a `DeviceRecord` is the
//! registry entry kept for every device ever observed. Phones that disconnect
//! keep their record so history stays continuous across reconnections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of monitored device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Laptop,
    Phone,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Laptop => write!(f, "laptop"),
            DeviceKind::Phone => write!(f, "phone"),
        }
    }
}

/// A single battery reading produced by a `DeviceSource`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Stable device identifier (serial number, ADB id, or "laptop")
    pub device_id: String,

    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// State of charge, 0.0 to 100.0
    pub percentage: f32,

    /// Whether the device reported external power / charging
    pub is_charging: bool,

    /// Battery voltage in millivolts, when the source reports it
    pub voltage_mv: Option<u32>,

    /// Battery temperature in tenths of a degree Celsius
    pub temperature_decideg_c: Option<i32>,
}

impl Sample {
    /// Create a reading with only the fields every source provides.
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        percentage: f32,
        is_charging: bool,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            percentage,
            is_charging,
            voltage_mv: None,
            temperature_decideg_c: None,
        }
    }

    /// Temperature in whole degrees Celsius, if reported.
    pub fn temperature_c(&self) -> Option<f32> {
        self.temperature_decideg_c.map(|t| t as f32 / 10.0)
    }
}

/// Registry entry for a monitored device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable device identifier
    pub device_id: String,

    /// Laptop or phone
    pub kind: DeviceKind,

    /// Alerting priority; higher wins when several devices charge at once
    pub priority: i32,

    /// Charge threshold that triggers the stop-charging alert
    pub threshold_percent: u8,

    /// Design capacity in mWh, when the platform exposes it
    pub design_capacity_mwh: Option<u32>,

    /// Most recently measured full-charge capacity in mWh
    pub full_charge_capacity_mwh: Option<u32>,

    /// Last time a sample was observed for this device
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(
        device_id: impl Into<String>,
        kind: DeviceKind,
        priority: i32,
        threshold_percent: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            priority,
            threshold_percent,
            design_capacity_mwh: None,
            full_charge_capacity_mwh: None,
            last_seen: now,
        }
    }

    /// Full-charge to design capacity ratio, when both are known.
    pub fn capacity_ratio(&self) -> Option<f32> {
        match (self.full_charge_capacity_mwh, self.design_capacity_mwh) {
            (Some(full), Some(design)) if design > 0 => Some(full as f32 / design as f32),
            _ => None,
        }
    }
}
