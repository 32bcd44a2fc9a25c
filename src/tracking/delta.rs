//! Per-minute battery delta tracking
//!
//! Apple-style percentage readings arrive at whatever cadence the scheduler
//! picked, so rate-of-change reporting is anchored to elapsed wall-clock
//! minutes instead of poll ticks: one `DeltaRecord` per full minute elapsed
//! since the previous anchor, computed from the first sample observed at or
//! after that boundary. No interpolation.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::device::Sample;

/// Minimum elapsed time before a new delta is emitted
const ANCHOR_INTERVAL_SECONDS: i64 = 60;

/// Rolling window of recent deltas kept for status and prediction fallback
const MAX_RECENT_DELTAS: usize = 60;

/// One minute-anchored percentage change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    /// Device this delta belongs to
    pub device_id: String,

    /// Timestamp of the anchor the delta was measured from
    pub anchor_timestamp: DateTime<Utc>,

    /// Percentage change since the anchor; positive while charging
    pub percentage_delta: f32,
}

/// Tracks the one-minute percentage delta for a single device
#[derive(Debug, Clone)]
pub struct DeltaTracker {
    device_id: String,
    anchor_timestamp: Option<DateTime<Utc>>,
    anchor_percentage: f32,
    recent: VecDeque<f32>,
}

impl DeltaTracker {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            anchor_timestamp: None,
            anchor_percentage: 0.0,
            recent: VecDeque::new(),
        }
    }

    /// Observe a sample; emits a record once >= 60s have elapsed since the
    /// current anchor, then re-anchors at this sample.
    pub fn observe(&mut self, sample: &Sample) -> Option<DeltaRecord> {
        let anchor_ts = match self.anchor_timestamp {
            Some(ts) => ts,
            None => {
                self.anchor_timestamp = Some(sample.timestamp);
                self.anchor_percentage = sample.percentage;
                return None;
            }
        };

        let elapsed = sample.timestamp - anchor_ts;
        if elapsed < Duration::seconds(ANCHOR_INTERVAL_SECONDS) {
            return None;
        }

        let record = DeltaRecord {
            device_id: self.device_id.clone(),
            anchor_timestamp: anchor_ts,
            percentage_delta: sample.percentage - self.anchor_percentage,
        };

        self.anchor_timestamp = Some(sample.timestamp);
        self.anchor_percentage = sample.percentage;

        self.recent.push_back(record.percentage_delta);
        while self.recent.len() > MAX_RECENT_DELTAS {
            self.recent.pop_front();
        }

        Some(record)
    }

    /// Most recent per-minute delta, if any minute has completed.
    pub fn latest(&self) -> Option<f32> {
        self.recent.back().copied()
    }

    /// Smallest delta in the rolling window.
    pub fn min_delta(&self) -> Option<f32> {
        self.recent.iter().copied().reduce(f32::min)
    }

    /// Largest delta in the rolling window.
    pub fn max_delta(&self) -> Option<f32> {
        self.recent.iter().copied().reduce(f32::max)
    }

    /// Mean delta over the rolling window.
    pub fn avg_delta(&self) -> Option<f32> {
        if self.recent.is_empty() {
            return None;
        }
        Some(self.recent.iter().sum::<f32>() / self.recent.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_at(seconds: i64, percentage: f32) -> Sample {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        Sample::new("laptop", t0 + Duration::seconds(seconds), percentage, true)
    }

    #[test]
    fn test_no_emission_before_minute_elapses() {
        let mut tracker = DeltaTracker::new("laptop");
        assert!(tracker.observe(&sample_at(0, 60.0)).is_none());
        assert!(tracker.observe(&sample_at(30, 61.0)).is_none());
        assert!(tracker.observe(&sample_at(59, 62.0)).is_none());
    }

    #[test]
    fn test_emits_once_per_minute_with_10s_polls() {
        let mut tracker = DeltaTracker::new("laptop");
        let mut emitted = Vec::new();
        for i in 0..=18 {
            let t = i * 10;
            if let Some(record) = tracker.observe(&sample_at(t, 60.0 + t as f32 / 60.0)) {
                emitted.push(record);
            }
        }
        // Samples span 180s; anchors at 0, 60 and 120 each complete a minute.
        assert_eq!(emitted.len(), 3);
        assert!((emitted[0].percentage_delta - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_emits_on_first_sample_past_boundary_with_45s_polls() {
        let mut tracker = DeltaTracker::new("laptop");
        assert!(tracker.observe(&sample_at(0, 60.0)).is_none());
        assert!(tracker.observe(&sample_at(45, 61.0)).is_none());
        // 90s after the anchor: first sample at or past the 60s boundary.
        let record = tracker.observe(&sample_at(90, 62.0)).unwrap();
        assert!((record.percentage_delta - 2.0).abs() < f32::EPSILON);
        // Re-anchored at 90s, so 135s is only 45s along.
        assert!(tracker.observe(&sample_at(135, 63.0)).is_none());
        assert!(tracker.observe(&sample_at(180, 64.0)).is_some());
    }

    #[test]
    fn test_slow_polls_emit_one_delta_per_observation() {
        let mut tracker = DeltaTracker::new("laptop");
        let mut emitted = 0;
        for i in 0..4 {
            if tracker.observe(&sample_at(i * 90, 60.0 + i as f32)).is_some() {
                emitted += 1;
            }
        }
        // 90s polls: every observation after the first completes a minute.
        assert_eq!(emitted, 3);
    }

    #[test]
    fn test_anchor_advances_monotonically() {
        let mut tracker = DeltaTracker::new("laptop");
        tracker.observe(&sample_at(0, 60.0));
        let first = tracker.observe(&sample_at(70, 61.0)).unwrap();
        let second = tracker.observe(&sample_at(140, 62.0)).unwrap();
        assert!(second.anchor_timestamp > first.anchor_timestamp);
        assert!(second.anchor_timestamp - first.anchor_timestamp >= Duration::seconds(60));
    }

    #[test]
    fn test_rolling_window_statistics() {
        let mut tracker = DeltaTracker::new("laptop");
        tracker.observe(&sample_at(0, 60.0));
        tracker.observe(&sample_at(60, 62.0)); // +2
        tracker.observe(&sample_at(120, 61.0)); // -1
        tracker.observe(&sample_at(180, 64.0)); // +3

        assert_eq!(tracker.latest(), Some(3.0));
        assert_eq!(tracker.min_delta(), Some(-1.0));
        assert_eq!(tracker.max_delta(), Some(3.0));
        let avg = tracker.avg_delta().unwrap();
        assert!((avg - 4.0 / 3.0).abs() < 0.001);
    }
}
