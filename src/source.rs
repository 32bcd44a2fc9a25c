//! Device source collaborator interface
//!
//! Reading battery attributes from an operating system, a paired phone, or
//! anything else is external I/O and lives behind the `DeviceSource` trait.
//! The monitor reads each source under a timeout so one stalled device never
//! blocks the others.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use crate::device::{DeviceKind, Sample};
use crate::error::SourceError;

/// A readable battery source for one device
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Stable identifier for the device behind this source.
    fn device_id(&self) -> &str;

    /// Kind of device behind this source.
    fn kind(&self) -> DeviceKind;

    /// Take one battery reading.
    async fn read(&self) -> Result<Sample, SourceError>;
}

/// Configurable fake source that ramps its charge level on every read.
///
/// Used by the demo binary and runner tests; real platform sources live
/// outside this crate.
pub struct SimulatedSource {
    device_id: String,
    kind: DeviceKind,
    state: Mutex<SimulatedState>,
}

struct SimulatedState {
    percentage: f32,
    is_charging: bool,
    step: f32,
}

impl SimulatedSource {
    pub fn new(device_id: impl Into<String>, kind: DeviceKind, start_percentage: f32) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            state: Mutex::new(SimulatedState {
                percentage: start_percentage,
                is_charging: true,
                step: 1.0,
            }),
        }
    }

    /// Percentage change applied on each read; negative simulates discharge.
    pub fn with_step(self, step: f32) -> Self {
        {
            let mut state = self.state_guard();
            state.step = step;
            state.is_charging = step >= 0.0;
        }
        self
    }

    /// Flip the simulated plug state.
    pub fn set_charging(&self, charging: bool) {
        let mut state = self.state_guard();
        state.is_charging = charging;
        state.step = if charging {
            state.step.abs()
        } else {
            -state.step.abs()
        };
    }

    fn state_guard(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        // The simulated state has no invariants a panic could break.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeviceSource for SimulatedSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn read(&self) -> Result<Sample, SourceError> {
        let mut state = self.state_guard();
        state.percentage = (state.percentage + state.step).clamp(0.0, 100.0);
        Ok(Sample::new(
            self.device_id.clone(),
            Utc::now(),
            state.percentage,
            state.is_charging,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_source_ramps() {
        let source = SimulatedSource::new("sim", DeviceKind::Laptop, 50.0).with_step(2.0);
        let first = source.read().await.unwrap();
        let second = source.read().await.unwrap();
        assert!(first.is_charging);
        assert!((first.percentage - 52.0).abs() < f32::EPSILON);
        assert!((second.percentage - 54.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_simulated_source_clamps_and_unplugs() {
        let source = SimulatedSource::new("sim", DeviceKind::Phone, 99.5).with_step(1.0);
        let sample = source.read().await.unwrap();
        assert!((sample.percentage - 100.0).abs() < f32::EPSILON);

        source.set_charging(false);
        let sample = source.read().await.unwrap();
        assert!(!sample.is_charging);
        assert!(sample.percentage < 100.0);
    }
}
