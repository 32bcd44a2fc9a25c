//! Adaptive polling scheduler
//!
//! Polling speeds up as a charging device approaches its threshold so the
//! exact crossing instant is not overshot, and returns to the base cadence
//! everywhere else. Alert suppression (snooze/dismiss) never changes the
//! cadence: history must stay complete.

use std::time::Duration;

use crate::config::MonitorConfig;
use crate::device::Sample;

/// Points below threshold where polling floors all the way down
const CLOSE_BAND: f32 = 2.0;

/// Decides the delay before a device's next sample
#[derive(Debug, Clone)]
pub struct AdaptivePollingScheduler {
    base: Duration,
    floor: Duration,
    near_band: f32,
}

impl AdaptivePollingScheduler {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            base: config.poll_interval(),
            floor: config.min_poll_interval(),
            near_band: config.near_threshold_band,
        }
    }

    /// Delay before the next sample for this device.
    pub fn next_delay(&self, threshold_percent: u8, sample: &Sample) -> Duration {
        if !sample.is_charging {
            return self.base;
        }

        let remaining = threshold_percent as f32 - sample.percentage;
        if remaining <= 0.0 {
            // At or past the threshold; the crossing already happened.
            return self.base;
        }

        if remaining <= CLOSE_BAND {
            self.floor
        } else if remaining <= self.near_band {
            // Halve, but never below the floor.
            std::cmp::max(self.base / 2, self.floor)
        } else {
            self.base
        }
    }
}
