//! Battery health scoring
//!
//! Two signal paths: a capacity ratio when the platform reports design and
//! full-charge capacity, else a charge-rate trend across recorded cycles.
//! Temperature above the hard limit overrides both. With neither signal the
//! analyzer says `Unknown` rather than inventing a number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceRecord, Sample};
use crate::tracking::cycle::ChargeCycle;

/// Temperature above which classification is forced to Overheat
const OVERHEAT_DECIDEG_C: i32 = 450;

/// Capacity ratio below which a battery is considered degraded
const DEGRADED_CAPACITY_RATIO: f32 = 0.80;

/// Capacity ratio below which a battery is merely fair
const FAIR_CAPACITY_RATIO: f32 = 0.90;

/// Minimum closed cycles before the trend path produces a score
const MIN_CYCLES_FOR_TREND: usize = 3;

/// Cycles averaged on each side of the trend comparison
const TREND_WINDOW: usize = 3;

/// Health classification buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthClassification {
    Good,
    Fair,
    Degraded,
    Overheat,
    Unknown,
}

/// A computed battery health score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub device_id: String,
    pub computed_at: DateTime<Utc>,
    /// 0-100; 100 when unknown
    pub score_percent: f32,
    pub classification: HealthClassification,
}

/// Computes health scores from capacity attributes and cycle history
#[derive(Debug, Default)]
pub struct HealthAnalyzer;

impl HealthAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Compute a fresh score for the device. `cycles` are newest first as
    /// returned by `Store::recent_cycles`.
    pub fn compute(
        &self,
        record: &DeviceRecord,
        last_sample: Option<&Sample>,
        cycles: &[ChargeCycle],
        now: DateTime<Utc>,
    ) -> HealthScore {
        // Overheat wins over every other signal.
        if let Some(temp) = last_sample.and_then(|s| s.temperature_decideg_c) {
            if temp > OVERHEAT_DECIDEG_C {
                let score = self.capacity_score(record).unwrap_or(100.0);
                return self.score(record, now, score, HealthClassification::Overheat);
            }
        }

        if let Some(score) = self.capacity_score(record) {
            let classification = if score < DEGRADED_CAPACITY_RATIO * 100.0 {
                HealthClassification::Degraded
            } else if score < FAIR_CAPACITY_RATIO * 100.0 {
                HealthClassification::Fair
            } else {
                HealthClassification::Good
            };
            return self.score(record, now, score, classification);
        }

        if let Some((score, classification)) = self.trend_score(cycles) {
            return self.score(record, now, score, classification);
        }

        self.score(record, now, 100.0, HealthClassification::Unknown)
    }

    fn capacity_score(&self, record: &DeviceRecord) -> Option<f32> {
        record.capacity_ratio().map(|r| (r * 100.0).clamp(0.0, 100.0))
    }

    /// Compare the recent average charge rate against the earliest cycles on
    /// record. A battery that charges markedly slower than it used to is
    /// degrading even when capacity attributes are unavailable.
    fn trend_score(&self, cycles: &[ChargeCycle]) -> Option<(f32, HealthClassification)> {
        if cycles.len() < MIN_CYCLES_FOR_TREND {
            return None;
        }

        let rates: Vec<f32> = cycles
            .iter()
            .filter_map(|c| c.rate_percent_per_minute())
            .filter(|r| *r > 0.0)
            .collect();
        if rates.len() < MIN_CYCLES_FOR_TREND {
            return None;
        }

        // Newest-first input: front is recent, back is the early baseline.
        let recent: f32 =
            rates.iter().take(TREND_WINDOW).sum::<f32>() / rates.iter().take(TREND_WINDOW).count() as f32;
        let baseline_slice: Vec<f32> = rates.iter().rev().take(TREND_WINDOW).copied().collect();
        let baseline: f32 = baseline_slice.iter().sum::<f32>() / baseline_slice.len() as f32;

        if baseline <= 0.0 {
            return None;
        }

        let degradation_percent = ((baseline - recent) / baseline * 100.0).max(0.0);
        let score = (100.0 - degradation_percent * 2.0).clamp(0.0, 100.0);

        let classification = if score < 70.0 {
            HealthClassification::Degraded
        } else if score < 85.0 {
            HealthClassification::Fair
        } else {
            HealthClassification::Good
        };
        Some((score, classification))
    }

    fn score(
        &self,
        record: &DeviceRecord,
        now: DateTime<Utc>,
        score_percent: f32,
        classification: HealthClassification,
    ) -> HealthScore {
        HealthScore {
            device_id: record.device_id.clone(),
            computed_at: now,
            score_percent,
            classification,
        }
    }
}
