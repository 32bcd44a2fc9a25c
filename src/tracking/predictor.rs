//! Historical regression predictor
//!
//! Estimates time-to-threshold while charging and time-to-empty while
//! discharging by fitting a low-order polynomial over historical cycles:
//! minutes-to-reach-target as a function of starting percentage. Below the
//! minimum basis count the predictor refuses rather than guessing. Models
//! are retrained lazily, only after a cycle closes, never per tick.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{DeviceRecord, Sample};
use crate::error::{MonitorError, Result};
use crate::store::Store;
use crate::tracking::cycle::ChargeCycle;

/// Hard precondition: fewer basis cycles than this means no prediction
pub const MIN_BASIS_CYCLES: usize = 5;

/// Confidence never claims certainty
const CONFIDENCE_CAP: f32 = 0.95;

/// Closed cycles pulled from the store per training pass
const TRAINING_CYCLE_LIMIT: usize = 100;

/// Sample window scanned for discharge segments
const DISCHARGE_WINDOW_HOURS: i64 = 48;

/// Discharge segments shorter than this are noise
const MIN_SEGMENT_SECONDS: i64 = 120;

/// A completed prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub device_id: String,

    /// Estimated seconds until the target is reached
    pub predicted_seconds: i64,

    /// 0.0 - 1.0, capped below certainty
    pub confidence: f32,

    /// Number of historical cycles or segments behind the estimate
    pub basis_cycle_count: usize,
}

/// Summary statistics over closed cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStatistics {
    pub total_cycles: usize,
    pub avg_duration_minutes: f32,
    pub min_duration_minutes: f32,
    pub max_duration_minutes: f32,
    pub avg_rate_percent_per_minute: f32,
    pub fastest_rate_percent_per_minute: f32,
    pub slowest_rate_percent_per_minute: f32,
}

/// Fitted polynomial model, cached between cycle closures
#[derive(Debug, Clone)]
struct FitModel {
    /// Coefficients of a0 + a1*x + a2*x^2
    coefficients: [f64; 3],
    /// Standard deviation of training residuals, in minutes
    residual_std: f64,
    basis_count: usize,
}

impl FitModel {
    fn evaluate(&self, x: f64) -> f64 {
        self.coefficients[0] + self.coefficients[1] * x + self.coefficients[2] * x * x
    }
}

/// Per-device charge/discharge time predictor
#[derive(Debug)]
pub struct Predictor {
    device_id: String,
    charge_model: Option<FitModel>,
    /// Target percentage the cached charge model was trained toward.
    charge_target: Option<f32>,
    discharge_model: Option<FitModel>,
    stale: bool,
}

impl Predictor {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            charge_model: None,
            charge_target: None,
            discharge_model: None,
            stale: true,
        }
    }

    /// Invalidate cached models; called when a cycle closes.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Predict time-to-threshold (charging) or time-to-empty (discharging)
    /// for the current sample.
    pub fn predict(
        &mut self,
        store: &dyn Store,
        record: &DeviceRecord,
        sample: &Sample,
    ) -> Result<PredictionResult> {
        if sample.is_charging {
            self.predict_to_threshold(store, record, sample)
        } else {
            self.predict_to_empty(store, sample)
        }
    }

    fn predict_to_threshold(
        &mut self,
        store: &dyn Store,
        record: &DeviceRecord,
        sample: &Sample,
    ) -> Result<PredictionResult> {
        let target = record.threshold_percent as f32;
        // A threshold change invalidates the cached model even without a
        // closed cycle, since the training target is baked into it.
        if self.stale || self.charge_model.is_none() || self.charge_target != Some(target) {
            self.retrain_charge_model(store, target)?;
        }
        let model = self
            .charge_model
            .as_ref()
            .ok_or(MonitorError::InsufficientHistory {
                have: 0,
                need: MIN_BASIS_CYCLES,
            })?;

        if sample.percentage >= target {
            return Ok(PredictionResult {
                device_id: self.device_id.clone(),
                predicted_seconds: 0,
                confidence: CONFIDENCE_CAP,
                basis_cycle_count: model.basis_count,
            });
        }

        let minutes = model.evaluate(sample.percentage as f64).max(0.0);
        Ok(self.finish(model, minutes))
    }

    fn predict_to_empty(&mut self, store: &dyn Store, sample: &Sample) -> Result<PredictionResult> {
        if self.stale || self.discharge_model.is_none() {
            self.retrain_discharge_model(store, sample.timestamp)?;
        }
        let model = self
            .discharge_model
            .as_ref()
            .ok_or(MonitorError::InsufficientHistory {
                have: 0,
                need: MIN_BASIS_CYCLES,
            })?;

        let minutes = model.evaluate(sample.percentage as f64).max(0.0);
        Ok(self.finish(model, minutes))
    }

    fn finish(&self, model: &FitModel, minutes: f64) -> PredictionResult {
        PredictionResult {
            device_id: self.device_id.clone(),
            predicted_seconds: (minutes * 60.0).round() as i64,
            confidence: confidence(model.basis_count, model.residual_std),
            basis_cycle_count: model.basis_count,
        }
    }

    fn retrain_charge_model(&mut self, store: &dyn Store, target: f32) -> Result<()> {
        let cycles = store.recent_cycles(&self.device_id, TRAINING_CYCLE_LIMIT)?;
        let points: Vec<(f64, f64)> = cycles
            .iter()
            .filter_map(|cycle| charge_training_point(cycle, target))
            .collect();

        if points.len() < MIN_BASIS_CYCLES {
            self.charge_model = None;
            self.charge_target = None;
            self.stale = false;
            return Err(MonitorError::InsufficientHistory {
                have: points.len(),
                need: MIN_BASIS_CYCLES,
            });
        }

        self.charge_model = Some(fit_polynomial(&points));
        self.charge_target = Some(target);
        self.stale = false;
        log::debug!(
            "retrained charge model for {} on {} cycles",
            self.device_id,
            points.len()
        );
        Ok(())
    }

    fn retrain_discharge_model(&mut self, store: &dyn Store, now: DateTime<Utc>) -> Result<()> {
        let since = now - Duration::hours(DISCHARGE_WINDOW_HOURS);
        let samples = store.recent_samples(&self.device_id, since)?;
        let points = discharge_training_points(&samples);

        if points.len() < MIN_BASIS_CYCLES {
            self.discharge_model = None;
            self.stale = false;
            return Err(MonitorError::InsufficientHistory {
                have: points.len(),
                need: MIN_BASIS_CYCLES,
            });
        }

        self.discharge_model = Some(fit_polynomial(&points));
        self.stale = false;
        log::debug!(
            "retrained discharge model for {} on {} segments",
            self.device_id,
            points.len()
        );
        Ok(())
    }
}

/// Summarize closed cycles for status output.
pub fn cycle_statistics(cycles: &[ChargeCycle]) -> Option<CycleStatistics> {
    let durations: Vec<f32> = cycles
        .iter()
        .filter(|c| c.duration_seconds() > 0)
        .map(|c| c.duration_seconds() as f32 / 60.0)
        .collect();
    let rates: Vec<f32> = cycles
        .iter()
        .filter_map(|c| c.rate_percent_per_minute())
        .collect();
    if durations.is_empty() || rates.is_empty() {
        return None;
    }

    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
    Some(CycleStatistics {
        total_cycles: cycles.len(),
        avg_duration_minutes: mean(&durations),
        min_duration_minutes: durations.iter().copied().fold(f32::INFINITY, f32::min),
        max_duration_minutes: durations.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        avg_rate_percent_per_minute: mean(&rates),
        fastest_rate_percent_per_minute: rates.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        slowest_rate_percent_per_minute: rates.iter().copied().fold(f32::INFINITY, f32::min),
    })
}

/// Training point for a charging cycle: starting percentage against the
/// minutes that cycle's rate would need to climb from its start to `target`.
fn charge_training_point(cycle: &ChargeCycle, target: f32) -> Option<(f64, f64)> {
    let rate = cycle.rate_percent_per_minute()?;
    if rate <= 0.0 || cycle.start_percentage >= target {
        return None;
    }
    let minutes = (target - cycle.start_percentage) / rate;
    Some((cycle.start_percentage as f64, minutes as f64))
}

/// Break the sample window into maximal discharging runs and convert each
/// into a (starting percentage, minutes-to-empty-at-that-rate) point.
fn discharge_training_points(samples: &[Sample]) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    let mut segment_start: Option<&Sample> = None;
    let mut segment_end: Option<&Sample> = None;

    let close_segment = |start: Option<&Sample>, end: Option<&Sample>, out: &mut Vec<(f64, f64)>| {
        let (Some(first), Some(last)) = (start, end) else {
            return;
        };
        let seconds = (last.timestamp - first.timestamp).num_seconds();
        let drop = first.percentage - last.percentage;
        if seconds < MIN_SEGMENT_SECONDS || drop <= 0.0 {
            return;
        }
        let rate = drop / (seconds as f32 / 60.0); // percent per minute
        let minutes_to_empty = first.percentage / rate;
        out.push((first.percentage as f64, minutes_to_empty as f64));
    };

    for sample in samples {
        if sample.is_charging {
            close_segment(segment_start, segment_end, &mut points);
            segment_start = None;
            segment_end = None;
        } else {
            if segment_start.is_none() {
                segment_start = Some(sample);
            }
            segment_end = Some(sample);
        }
    }
    close_segment(segment_start, segment_end, &mut points);
    points
}

/// Least-squares fit of a0 + a1*x + a2*x^2 via the normal equations.
/// Degrades to a lower order when the system is singular (e.g. every cycle
/// started at the same percentage).
fn fit_polynomial(points: &[(f64, f64)]) -> FitModel {
    let coefficients = solve_degree2(points)
        .or_else(|| solve_degree1(points))
        .unwrap_or_else(|| {
            let mean = points.iter().map(|p| p.1).sum::<f64>() / points.len() as f64;
            [mean, 0.0, 0.0]
        });

    let residual_sq: f64 = points
        .iter()
        .map(|(x, y)| {
            let fitted = coefficients[0] + coefficients[1] * x + coefficients[2] * x * x;
            (y - fitted).powi(2)
        })
        .sum();
    let residual_std = (residual_sq / points.len() as f64).sqrt();

    FitModel {
        coefficients,
        residual_std,
        basis_count: points.len(),
    }
}

fn solve_degree2(points: &[(f64, f64)]) -> Option<[f64; 3]> {
    let n = points.len() as f64;
    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        s1 += x;
        s2 += x * x;
        s3 += x * x * x;
        s4 += x * x * x * x;
        t0 += y;
        t1 += x * y;
        t2 += x * x * y;
    }

    let matrix = [[n, s1, s2], [s1, s2, s3], [s2, s3, s4]];
    let rhs = [t0, t1, t2];
    gaussian_solve(matrix, rhs)
}

fn solve_degree1(points: &[(f64, f64)]) -> Option<[f64; 3]> {
    let n = points.len() as f64;
    let (mut s1, mut s2) = (0.0, 0.0);
    let (mut t0, mut t1) = (0.0, 0.0);
    for &(x, y) in points {
        s1 += x;
        s2 += x * x;
        t0 += y;
        t1 += x * y;
    }
    let det = n * s2 - s1 * s1;
    if det.abs() < 1e-9 {
        return None;
    }
    let a0 = (t0 * s2 - s1 * t1) / det;
    let a1 = (n * t1 - s1 * t0) / det;
    Some([a0, a1, 0.0])
}

/// Solve a 3x3 linear system with partial pivoting.
fn gaussian_solve(mut m: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot_row = (col..3).max_by(|&a, &r| {
            m[a][col]
                .abs()
                .partial_cmp(&m[r][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot_row][col].abs() < 1e-9 {
            return None;
        }
        m.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut sum = b[row];
        for k in (row + 1)..3 {
            sum -= m[row][k] * x[k];
        }
        x[row] = sum / m[row][row];
    }
    Some(x)
}

/// Confidence grows with basis count, shrinks with loose residuals, and is
/// capped below certainty. Monotonically non-decreasing in basis count for a
/// fixed residual.
fn confidence(basis_count: usize, residual_std: f64) -> f32 {
    let count_base = (0.5 + basis_count as f32 / 100.0).min(0.9);
    let residual_factor = 1.0 / (1.0 + (residual_std as f32 / 30.0));
    (count_base * (0.5 + 0.5 * residual_factor)).clamp(0.1, CONFIDENCE_CAP)
}
