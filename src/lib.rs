//! ChargeGuard: battery charge monitoring core
//!
//! Polls one or more battery sources, tracks percentage deltas and charge
//! cycles, scores battery health, predicts time-to-threshold from recorded
//! cycle history, and drives a snoozeable threshold alert. The decision
//! core is synchronous and deterministic; `monitor` wraps it in a tokio
//! runner with one polling task per device.

pub mod alert;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod scheduling;
pub mod source;
pub mod store;
pub mod tracking;

pub use alert::{AlertDecision, AlertState, ThresholdAlertStateMachine};
pub use config::{DeviceConfig, MonitorConfig};
pub use coordinator::{DeviceCoordinator, Effect};
pub use device::{DeviceKind, DeviceRecord, Sample};
pub use error::{ConfigError, MonitorError, Result, SourceError, StoreError};
pub use monitor::{Monitor, MonitorCommand, RunningMonitor};
pub use notify::{AlertKind, AlertPayload, LogNotifier, Notifier};
pub use scheduling::AdaptivePollingScheduler;
pub use source::{DeviceSource, SimulatedSource};
pub use store::{MemoryStore, Store};
pub use tracking::{
    ChargeCycle, ChargeCycleDetector, DeltaRecord, DeltaTracker, HealthAnalyzer,
    HealthClassification, HealthScore, PredictionResult, Predictor,
};
