//! History store collaborator interface
//!
//! Persisting samples and closed cycles is the collaborator's concern; the
//! core only needs append and bounded retrieval. `MemoryStore` is the
//! reference implementation used by tests and the demo binary. Writes are
//! serialized per call through the lock; reads run concurrently.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::device::Sample;
use crate::error::StoreError;
use crate::tracking::cycle::ChargeCycle;

/// Samples retained per device by the in-memory store
const MAX_SAMPLES_PER_DEVICE: usize = 10_000;

/// Cycles retained per device by the in-memory store
const MAX_CYCLES_PER_DEVICE: usize = 500;

/// Battery history store
pub trait Store: Send + Sync {
    /// Append one sample to the device's history.
    fn append_sample(&self, sample: &Sample) -> Result<(), StoreError>;

    /// Persist a closed charge cycle.
    fn close_cycle(&self, cycle: &ChargeCycle) -> Result<(), StoreError>;

    /// Most recent closed cycles for a device, newest first, up to `limit`.
    fn recent_cycles(&self, device_id: &str, limit: usize) -> Result<Vec<ChargeCycle>, StoreError>;

    /// Samples for a device at or after `since`, oldest first.
    fn recent_samples(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError>;
}

/// In-memory store with bounded per-device history
#[derive(Default)]
pub struct MemoryStore {
    samples: RwLock<HashMap<String, Vec<Sample>>>,
    cycles: RwLock<HashMap<String, Vec<ChargeCycle>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total cycles recorded for a device.
    pub fn cycle_count(&self, device_id: &str) -> usize {
        self.cycles
            .read()
            .map(|map| map.get(device_id).map(|v| v.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Store for MemoryStore {
    fn append_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        let mut map = self
            .samples
            .write()
            .map_err(|_| StoreError::WriteFailure("sample lock poisoned".into()))?;
        let history = map.entry(sample.device_id.clone()).or_default();
        history.push(sample.clone());
        if history.len() > MAX_SAMPLES_PER_DEVICE {
            let excess = history.len() - MAX_SAMPLES_PER_DEVICE;
            history.drain(..excess);
        }
        Ok(())
    }

    fn close_cycle(&self, cycle: &ChargeCycle) -> Result<(), StoreError> {
        let mut map = self
            .cycles
            .write()
            .map_err(|_| StoreError::WriteFailure("cycle lock poisoned".into()))?;
        let history = map.entry(cycle.device_id.clone()).or_default();
        history.push(cycle.clone());
        if history.len() > MAX_CYCLES_PER_DEVICE {
            let excess = history.len() - MAX_CYCLES_PER_DEVICE;
            history.drain(..excess);
        }
        Ok(())
    }

    fn recent_cycles(&self, device_id: &str, limit: usize) -> Result<Vec<ChargeCycle>, StoreError> {
        let map = self
            .cycles
            .read()
            .map_err(|_| StoreError::ReadFailure("cycle lock poisoned".into()))?;
        Ok(map
            .get(device_id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn recent_samples(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        let map = self
            .samples
            .read()
            .map_err(|_| StoreError::ReadFailure("sample lock poisoned".into()))?;
        Ok(map
            .get(device_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
