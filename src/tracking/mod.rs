//! Per-device signal pipeline: deltas, cycles, health, prediction

pub mod cycle;
pub mod delta;
pub mod health;
pub mod predictor;

pub use cycle::{ChargeCycle, ChargeCycleDetector};
pub use delta::{DeltaRecord, DeltaTracker};
pub use health::{HealthAnalyzer, HealthClassification, HealthScore};
pub use predictor::{cycle_statistics, CycleStatistics, PredictionResult, Predictor};
