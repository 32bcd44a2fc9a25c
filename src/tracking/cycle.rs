//! Charge cycle detection
//!
//! Segments a device's sample stream into contiguous charging intervals.
//! A cycle opens when charging starts, tracks the last charging sample while
//! it stays open, and closes when the plug is pulled or the percentage drops
//! past the debounce margin (an unplug race reported as still-charging).
//! Plug-bounce artifacts shorter than the degenerate limits are discarded.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::device::Sample;

/// Percentage drop tolerated before a nominally-charging sample closes the cycle
pub const DEBOUNCE_MARGIN_PERCENT: f32 = 2.0;

/// Minimum duration for a closed cycle to be emitted
pub const MIN_CYCLE_SECONDS: i64 = 30;

/// Minimum sample count for a closed cycle to be emitted
pub const MIN_CYCLE_SAMPLES: u32 = 2;

/// A contiguous charging interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeCycle {
    /// Device this cycle belongs to
    pub device_id: String,

    /// When charging started
    pub start_time: DateTime<Utc>,

    /// When charging stopped; `None` while the cycle is open
    pub end_time: Option<DateTime<Utc>>,

    /// Percentage at plug-in
    pub start_percentage: f32,

    /// Percentage at the last charging sample; `None` until one is seen
    pub end_percentage: Option<f32>,

    /// Number of samples observed while the cycle was open
    pub sample_count: u32,
}

impl ChargeCycle {
    fn open(sample: &Sample) -> Self {
        Self {
            device_id: sample.device_id.clone(),
            start_time: sample.timestamp,
            end_time: None,
            start_percentage: sample.percentage,
            end_percentage: Some(sample.percentage),
            sample_count: 1,
        }
    }

    /// Cycle length in seconds; zero while open.
    pub fn duration_seconds(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
            .unwrap_or(0)
    }

    /// Average charge rate in percentage points per minute, if measurable.
    pub fn rate_percent_per_minute(&self) -> Option<f32> {
        let seconds = self.duration_seconds();
        if seconds <= 0 {
            return None;
        }
        let end = self.end_percentage?;
        Some((end - self.start_percentage) / (seconds as f32 / 60.0))
    }

    fn is_degenerate(&self, min_seconds: i64) -> bool {
        self.duration_seconds() < min_seconds || self.sample_count < MIN_CYCLE_SAMPLES
    }
}

/// Detects cycle boundaries for a single device
#[derive(Debug, Clone)]
pub struct ChargeCycleDetector {
    open_cycle: Option<ChargeCycle>,
    debounce_margin: f32,
    min_cycle_seconds: i64,
}

impl ChargeCycleDetector {
    pub fn new() -> Self {
        Self {
            open_cycle: None,
            debounce_margin: DEBOUNCE_MARGIN_PERCENT,
            min_cycle_seconds: MIN_CYCLE_SECONDS,
        }
    }

    pub fn with_tunables(debounce_margin: f32, min_cycle_seconds: i64) -> Self {
        Self {
            open_cycle: None,
            debounce_margin,
            min_cycle_seconds,
        }
    }

    /// Whether a cycle is currently open.
    pub fn has_open_cycle(&self) -> bool {
        self.open_cycle.is_some()
    }

    /// The currently open cycle, if any.
    pub fn open_cycle(&self) -> Option<&ChargeCycle> {
        self.open_cycle.as_ref()
    }

    /// Observe a sample; returns a closed cycle on a boundary transition.
    pub fn observe(&mut self, sample: &Sample) -> Option<ChargeCycle> {
        match self.open_cycle.take() {
            None => {
                if sample.is_charging {
                    self.open_cycle = Some(ChargeCycle::open(sample));
                }
                None
            }
            Some(mut cycle) => {
                let noisy_drop = sample.is_charging
                    && cycle
                        .end_percentage
                        .is_some_and(|last| last - sample.percentage > self.debounce_margin);

                if sample.is_charging && !noisy_drop {
                    cycle.end_time = Some(sample.timestamp);
                    cycle.end_percentage = Some(sample.percentage);
                    cycle.sample_count += 1;
                    self.open_cycle = Some(cycle);
                    return None;
                }

                // Close at the last charging sample's values, not this one.
                let closed = self.close(cycle, None);

                // A noisy drop while still plugged starts a fresh cycle so
                // the charging interval after the glitch is not lost.
                if noisy_drop {
                    self.open_cycle = Some(ChargeCycle::open(sample));
                }

                closed
            }
        }
    }

    /// Close any open cycle, e.g. on shutdown. Unlike regular closures the
    /// result is emitted even when degenerate so history is not silently
    /// truncated. A cycle that already carries an end stamp from its last
    /// charging sample keeps it; `now` is used only when no charging sample
    /// ever stamped one, so the recorded duration never includes trailing
    /// idle time.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<ChargeCycle> {
        let mut cycle = self.open_cycle.take()?;
        if cycle.end_time.is_none() {
            cycle.end_time = Some(now);
        }
        Some(cycle)
    }

    fn close(&self, mut cycle: ChargeCycle, at: Option<DateTime<Utc>>) -> Option<ChargeCycle> {
        if let Some(ts) = at {
            cycle.end_time = Some(ts);
        } else if cycle.end_time.is_none() {
            // Single-sample cycle: close it where it opened.
            cycle.end_time = Some(cycle.start_time + Duration::zero());
        }
        if cycle.is_degenerate(self.min_cycle_seconds) {
            log::debug!(
                "discarding degenerate cycle for {}: {}s, {} samples",
                cycle.device_id,
                cycle.duration_seconds(),
                cycle.sample_count
            );
            return None;
        }
        Some(cycle)
    }
}

impl Default for ChargeCycleDetector {
    fn default() -> Self {
        Self::new()
    }
}
