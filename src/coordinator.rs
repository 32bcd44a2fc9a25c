//! Device coordination
//!
//! Owns the live per-device state (delta tracker, cycle detector, alert
//! machine, predictor cache) and runs the per-sample pipeline: persist,
//! track, detect, analyze, predict, alert. The coordinator is a pure
//! decision engine; side effects come back as an effect list for the caller
//! to execute, which keeps every decision testable without mocked I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alert::{AlertState, ThresholdAlertStateMachine};
use crate::config::MonitorConfig;
use crate::device::{DeviceKind, DeviceRecord, Sample};
use crate::error::{MonitorError, Result, SourceError};
use crate::notify::{AlertKind, AlertPayload};
use crate::scheduling::AdaptivePollingScheduler;
use crate::store::Store;
use crate::tracking::cycle::ChargeCycle;
use crate::tracking::health::{HealthAnalyzer, HealthClassification, HealthScore};
use crate::tracking::predictor::{PredictionResult, Predictor};
use crate::tracking::{ChargeCycleDetector, DeltaTracker};

/// Cycles pulled for health analysis
const HEALTH_CYCLE_LIMIT: usize = 20;

/// Outcome of a tick, executed by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// An alert was decided for delivery
    AlertDecided {
        device_id: String,
        kind: AlertKind,
        payload: AlertPayload,
    },

    /// A charge cycle closed and was persisted
    CycleClosed(ChargeCycle),

    /// The predictor produced a fresh estimate
    PredictionUpdated(PredictionResult),
}

/// Live state for one registered device
struct DeviceState {
    record: DeviceRecord,
    delta: DeltaTracker,
    detector: ChargeCycleDetector,
    alert: ThresholdAlertStateMachine,
    predictor: Predictor,
    last_sample: Option<Sample>,
    last_health: Option<HealthClassification>,
    /// Samples that failed to persist, retried next tick
    pending_writes: Vec<Sample>,
}

/// Orchestrates the per-tick pipeline across all registered devices
pub struct DeviceCoordinator {
    config: MonitorConfig,
    store: Arc<dyn Store>,
    health: HealthAnalyzer,
    scheduler: AdaptivePollingScheduler,
    devices: HashMap<String, DeviceState>,
}

impl DeviceCoordinator {
    pub fn new(config: MonitorConfig, store: Arc<dyn Store>) -> Self {
        let scheduler = AdaptivePollingScheduler::new(&config);
        Self {
            config,
            store,
            health: HealthAnalyzer::new(),
            scheduler,
            devices: HashMap::new(),
        }
    }

    /// Register a device, creating its record on first sight. Records are
    /// never implicitly deleted; a phone that disconnects keeps its history.
    pub fn register_device(&mut self, device_id: &str, kind: DeviceKind, now: DateTime<Utc>) {
        if self.devices.contains_key(device_id) {
            return;
        }
        let threshold = self.config.threshold_for(device_id);
        let priority = self.config.priority_for(device_id);
        let record = DeviceRecord::new(device_id, kind, priority, threshold, now);
        log::info!(
            "registered {} '{}' (priority {}, threshold {}%)",
            kind,
            device_id,
            priority,
            threshold
        );
        self.devices.insert(
            device_id.to_string(),
            DeviceState {
                record,
                delta: DeltaTracker::new(device_id),
                detector: ChargeCycleDetector::with_tunables(
                    self.config.debounce_margin,
                    self.config.min_cycle_seconds,
                ),
                alert: ThresholdAlertStateMachine::new(
                    device_id,
                    threshold,
                    self.config.snooze_seconds,
                ),
                predictor: Predictor::new(device_id),
                last_sample: None,
                last_health: None,
                pending_writes: Vec::new(),
            },
        );
    }

    /// Registered device ids.
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Current alert state for a device.
    pub fn alert_state(&self, device_id: &str) -> Option<AlertState> {
        self.devices.get(device_id).map(|d| d.alert.state())
    }

    /// Latest health score for a device, computed on demand.
    pub fn health_score(&self, device_id: &str, now: DateTime<Utc>) -> Result<HealthScore> {
        let state = self
            .devices
            .get(device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        let cycles = self.store.recent_cycles(device_id, HEALTH_CYCLE_LIMIT)?;
        Ok(self
            .health
            .compute(&state.record, state.last_sample.as_ref(), &cycles, now))
    }

    /// Run the pipeline for one sample.
    pub fn process_sample(&mut self, sample: &Sample, now: DateTime<Utc>) -> Vec<Effect> {
        self.register_device_for_sample(sample, now);
        let mut effects = Vec::new();

        self.persist_sample(sample);

        let Some(state) = self.devices.get_mut(&sample.device_id) else {
            return effects;
        };
        state.record.last_seen = now;
        state.last_sample = Some(sample.clone());

        if let Some(delta) = state.delta.observe(sample) {
            log::debug!(
                "[{}] d1m {:+.1}% at {}",
                sample.device_id,
                delta.percentage_delta,
                delta.anchor_timestamp
            );
        }

        if let Some(closed) = state.detector.observe(sample) {
            effects.extend(self.handle_cycle_close(&sample.device_id, closed, now));
        }

        let active = self.is_active(&sample.device_id);
        let Some(state) = self.devices.get_mut(&sample.device_id) else {
            return effects;
        };
        if !active {
            // Non-active devices still clear dismissals, expire snoozes,
            // and re-arm; only the firing decision is reserved for the
            // active device.
            state.alert.maintain(sample, now);
        } else if let Some(decision) = state.alert.observe(sample, now) {
            log::info!(
                "[{}] threshold alert decided at {:.0}%",
                decision.device_id,
                decision.percentage
            );
            effects.push(Effect::AlertDecided {
                device_id: decision.device_id,
                kind: AlertKind::ThresholdReached,
                payload: AlertPayload {
                    percentage: decision.percentage,
                    threshold_percent: decision.threshold_percent,
                    reached_at: decision.reached_at,
                    health_score: None,
                    detail: None,
                },
            });
        }

        effects
    }

    /// Record that a device could not be read this tick. State is kept
    /// as-is; evaluation resumes on the next successful sample.
    pub fn note_unavailable(&mut self, device_id: &str, error: &SourceError) {
        log::warn!("[{}] skipping tick: {}", device_id, error);
    }

    /// Delay before this device's next sample.
    pub fn next_delay(&self, sample: &Sample) -> Duration {
        let threshold = self
            .devices
            .get(&sample.device_id)
            .map(|d| d.alert.threshold_percent())
            .unwrap_or(self.config.threshold_percent);
        self.scheduler.next_delay(threshold, sample)
    }

    /// Snooze the device's active alert.
    pub fn snooze(&mut self, device_id: &str, now: DateTime<Utc>) -> Result<()> {
        let state = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        state.alert.snooze(now);
        Ok(())
    }

    /// Dismiss the device's active alert until unplug.
    pub fn dismiss(&mut self, device_id: &str) -> Result<()> {
        let state = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        state.alert.dismiss();
        Ok(())
    }

    /// Change a device's threshold live; may decide an alert immediately.
    pub fn set_threshold(
        &mut self,
        device_id: &str,
        threshold_percent: u8,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>> {
        if threshold_percent < 1 || threshold_percent > 100 {
            return Err(crate::error::ConfigError::ThresholdOutOfRange(threshold_percent).into());
        }
        let state = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| MonitorError::DeviceNotFound(device_id.to_string()))?;
        state.record.threshold_percent = threshold_percent;

        let mut effects = Vec::new();
        if let Some(decision) = state.alert.set_threshold(threshold_percent, now) {
            effects.push(Effect::AlertDecided {
                device_id: decision.device_id,
                kind: AlertKind::ThresholdReached,
                payload: AlertPayload {
                    percentage: decision.percentage,
                    threshold_percent: decision.threshold_percent,
                    reached_at: decision.reached_at,
                    health_score: None,
                    detail: None,
                },
            });
        }
        Ok(effects)
    }

    /// Close all open cycles, e.g. on shutdown, so history is not truncated.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        let device_ids: Vec<String> = self.devices.keys().cloned().collect();
        for device_id in device_ids {
            let flushed = self
                .devices
                .get_mut(&device_id)
                .and_then(|state| state.detector.flush(now));
            if let Some(cycle) = flushed {
                effects.extend(self.handle_cycle_close(&device_id, cycle, now));
            }
        }
        effects
    }

    /// The device whose alerts are currently live: the highest-priority
    /// charging phone wins over everything else; otherwise the
    /// highest-priority device on record. All other devices keep sampling;
    /// their machines are maintained but never decide.
    pub fn active_device(&self) -> Option<String> {
        let charging_phone = self
            .devices
            .values()
            .filter(|d| {
                d.record.kind == DeviceKind::Phone
                    && d.last_sample.as_ref().is_some_and(|s| s.is_charging)
            })
            .max_by_key(|d| d.record.priority);
        if let Some(phone) = charging_phone {
            return Some(phone.record.device_id.clone());
        }
        self.devices
            .values()
            .max_by_key(|d| (d.record.kind == DeviceKind::Laptop, d.record.priority))
            .map(|d| d.record.device_id.clone())
    }

    fn is_active(&self, device_id: &str) -> bool {
        self.active_device().as_deref() == Some(device_id)
    }

    fn register_device_for_sample(&mut self, sample: &Sample, now: DateTime<Utc>) {
        if !self.devices.contains_key(&sample.device_id) {
            // Sources report their kind at registration; a bare sample from
            // an unknown device defaults to laptop until configured.
            self.register_device(&sample.device_id, DeviceKind::Laptop, now);
        }
    }

    /// Append the sample, draining any writes buffered from earlier store
    /// failures first. Persistence never blocks the alert decision.
    fn persist_sample(&mut self, sample: &Sample) {
        let Some(state) = self.devices.get_mut(&sample.device_id) else {
            return;
        };

        let mut to_write = std::mem::take(&mut state.pending_writes);
        to_write.push(sample.clone());

        for queued in to_write {
            if let Err(e) = self.store.append_sample(&queued) {
                log::warn!(
                    "[{}] buffering sample after store failure: {}",
                    sample.device_id,
                    e
                );
                state.pending_writes.push(queued);
            }
        }
    }

    fn handle_cycle_close(
        &mut self,
        device_id: &str,
        cycle: ChargeCycle,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Err(e) = self.store.close_cycle(&cycle) {
            log::error!("[{}] failed to persist closed cycle: {}", device_id, e);
        }
        log::info!(
            "[{}] cycle closed: {:.0}% -> {:.0}% over {}s",
            device_id,
            cycle.start_percentage,
            cycle.end_percentage.unwrap_or(cycle.start_percentage),
            cycle.duration_seconds()
        );
        effects.push(Effect::CycleClosed(cycle));

        // Health is re-scored on cycle boundaries; entering a degraded or
        // overheated classification decides a health warning.
        let cycles = self
            .store
            .recent_cycles(device_id, HEALTH_CYCLE_LIMIT)
            .unwrap_or_default();
        let Some(state) = self.devices.get_mut(device_id) else {
            return effects;
        };
        state.predictor.mark_stale();
        let score = self
            .health
            .compute(&state.record, state.last_sample.as_ref(), &cycles, now);
        let warn_worthy = matches!(
            score.classification,
            HealthClassification::Degraded | HealthClassification::Overheat
        );
        let newly = state.last_health != Some(score.classification);
        state.last_health = Some(score.classification);
        if warn_worthy && newly {
            log::warn!(
                "[{}] health {:?} (score {:.0})",
                device_id,
                score.classification,
                score.score_percent
            );
            effects.push(Effect::AlertDecided {
                device_id: device_id.to_string(),
                kind: AlertKind::HealthWarning,
                payload: AlertPayload {
                    percentage: state
                        .last_sample
                        .as_ref()
                        .map(|s| s.percentage)
                        .unwrap_or(0.0),
                    threshold_percent: state.record.threshold_percent,
                    reached_at: now,
                    health_score: Some(score.score_percent),
                    detail: Some(format!("battery health {:?}", score.classification)),
                },
            });
        }

        // The freshly closed cycle invalidated the model; retrain now so the
        // cost lands on cycle boundaries, not on every tick.
        if let Some(sample) = state.last_sample.clone() {
            match state.predictor.predict(self.store.as_ref(), &state.record, &sample) {
                Ok(prediction) => effects.push(Effect::PredictionUpdated(prediction)),
                Err(MonitorError::InsufficientHistory { have, need }) => {
                    log::debug!(
                        "[{}] prediction unavailable: {}/{} cycles",
                        device_id,
                        have,
                        need
                    );
                }
                Err(e) => log::warn!("[{}] prediction failed: {}", device_id, e),
            }
        }

        effects
    }
}
