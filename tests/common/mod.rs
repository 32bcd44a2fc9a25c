//! Shared fakes and builders for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use chargeguard::device::{DeviceKind, Sample};
use chargeguard::error::{SourceError, StoreError};
use chargeguard::notify::{AlertKind, AlertPayload, Notifier};
use chargeguard::source::DeviceSource;
use chargeguard::store::{MemoryStore, Store};
use chargeguard::tracking::ChargeCycle;

/// Fixed origin so test timestamps stay readable.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

pub fn sample_at(device_id: &str, seconds: i64, percentage: f32, charging: bool) -> Sample {
    Sample::new(device_id, t0() + Duration::seconds(seconds), percentage, charging)
}

/// Closed charging cycle climbing from `start_pct` at `rate` percent per
/// minute until it hits `end_pct`.
pub fn charge_cycle(
    device_id: &str,
    offset_hours: i64,
    start_pct: f32,
    end_pct: f32,
    rate_per_minute: f32,
) -> ChargeCycle {
    let start = t0() + Duration::hours(offset_hours);
    let minutes = ((end_pct - start_pct) / rate_per_minute) as i64;
    ChargeCycle {
        device_id: device_id.to_string(),
        start_time: start,
        end_time: Some(start + Duration::minutes(minutes)),
        start_percentage: start_pct,
        end_percentage: Some(end_pct),
        sample_count: (minutes * 2).max(2) as u32,
    }
}

/// Source that replays a fixed script of readings, then reports itself
/// unavailable.
pub struct ScriptedSource {
    device_id: String,
    kind: DeviceKind,
    script: Mutex<VecDeque<Result<Sample, SourceError>>>,
}

impl ScriptedSource {
    pub fn new(device_id: &str, kind: DeviceKind) -> Self {
        Self {
            device_id: device_id.to_string(),
            kind,
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_sample(&self, sample: Sample) {
        self.script.lock().unwrap().push_back(Ok(sample));
    }

    pub fn push_error(&self, error: SourceError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl DeviceSource for ScriptedSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn read(&self) -> Result<Sample, SourceError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Unavailable(self.device_id.clone())))
    }
}

/// Notifier that records every delivery for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, AlertKind, AlertPayload)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(String, AlertKind, AlertPayload)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: AlertKind) -> usize {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, device_id: &str, kind: AlertKind, payload: &AlertPayload) {
        self.deliveries
            .lock()
            .unwrap()
            .push((device_id.to_string(), kind, payload.clone()));
    }
}

/// Store wrapper whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl Store for FlakyStore {
    fn append_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailure("injected failure".to_string()));
        }
        self.inner.append_sample(sample)
    }

    fn close_cycle(&self, cycle: &ChargeCycle) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailure("injected failure".to_string()));
        }
        self.inner.close_cycle(cycle)
    }

    fn recent_cycles(&self, device_id: &str, limit: usize) -> Result<Vec<ChargeCycle>, StoreError> {
        self.inner.recent_cycles(device_id, limit)
    }

    fn recent_samples(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        self.inner.recent_samples(device_id, since)
    }
}
