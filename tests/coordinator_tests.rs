//! Coordinator pipeline tests: persistence retry, device precedence, and
//! effect emission across multiple devices

mod common;

use std::sync::Arc;

use chrono::Duration;
use pretty_assertions::assert_eq;

use chargeguard::alert::AlertState;
use chargeguard::config::MonitorConfig;
use chargeguard::coordinator::{DeviceCoordinator, Effect};
use chargeguard::device::DeviceKind;
use chargeguard::notify::AlertKind;
use chargeguard::store::{MemoryStore, Store};

use common::{sample_at, t0, FlakyStore};

fn coordinator_with(store: Arc<dyn Store>) -> DeviceCoordinator {
    let mut config = MonitorConfig::default();
    config.threshold_percent = 80;
    DeviceCoordinator::new(config, store)
}

#[test]
fn test_failed_writes_are_buffered_and_replayed() {
    let store = Arc::new(FlakyStore::new());
    let mut c = coordinator_with(store.clone());
    c.register_device("laptop", DeviceKind::Laptop, t0());

    store.set_failing(true);
    c.process_sample(&sample_at("laptop", 0, 50.0, true), t0());
    c.process_sample(&sample_at("laptop", 30, 50.5, true), t0() + Duration::seconds(30));
    assert!(store.inner().recent_samples("laptop", t0()).unwrap().is_empty());

    // Store recovers: the next tick drains the buffer along with its own
    // sample.
    store.set_failing(false);
    c.process_sample(&sample_at("laptop", 60, 51.0, true), t0() + Duration::seconds(60));
    let persisted = store.inner().recent_samples("laptop", t0()).unwrap();
    assert_eq!(persisted.len(), 3);
    assert!(persisted.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_store_failure_never_blocks_the_alert() {
    let store = Arc::new(FlakyStore::new());
    let mut c = coordinator_with(store.clone());
    c.register_device("laptop", DeviceKind::Laptop, t0());

    store.set_failing(true);
    let effects = c.process_sample(&sample_at("laptop", 0, 85.0, true), t0());
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::AlertDecided { kind: AlertKind::ThresholdReached, .. })));
}

#[test]
fn test_cycle_close_persists_and_reports() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store.clone());
    c.register_device("laptop", DeviceKind::Laptop, t0());

    c.process_sample(&sample_at("laptop", 0, 40.0, true), t0());
    c.process_sample(&sample_at("laptop", 300, 45.0, true), t0() + Duration::seconds(300));
    let effects = c.process_sample(
        &sample_at("laptop", 600, 45.0, false),
        t0() + Duration::seconds(600),
    );

    assert!(effects.iter().any(|e| matches!(e, Effect::CycleClosed(_))));
    assert_eq!(store.cycle_count("laptop"), 1);
}

#[test]
fn test_charging_phone_takes_over_alerting() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store);
    c.register_device("laptop", DeviceKind::Laptop, t0());
    c.register_device("phone", DeviceKind::Phone, t0());

    c.process_sample(&sample_at("laptop", 0, 50.0, true), t0());
    assert_eq!(c.active_device().as_deref(), Some("laptop"));

    // Phone plugs in: it owns alerting even at lower percentage.
    c.process_sample(&sample_at("phone", 10, 30.0, true), t0() + Duration::seconds(10));
    assert_eq!(c.active_device().as_deref(), Some("phone"));

    // The laptop crossing its threshold while inactive stays quiet; its
    // machine holds the crossing without deciding.
    let effects = c.process_sample(
        &sample_at("laptop", 60, 85.0, true),
        t0() + Duration::seconds(60),
    );
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::AlertDecided { .. })));
    assert_eq!(c.alert_state("laptop"), Some(AlertState::Armed));

    // Phone unplugs; control returns to the laptop, which fires on its next
    // qualifying sample.
    c.process_sample(&sample_at("phone", 120, 30.0, false), t0() + Duration::seconds(120));
    assert_eq!(c.active_device().as_deref(), Some("laptop"));
    let effects = c.process_sample(
        &sample_at("laptop", 180, 86.0, true),
        t0() + Duration::seconds(180),
    );
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::AlertDecided { kind: AlertKind::ThresholdReached, .. })));
}

#[test]
fn test_dismissed_phone_refires_after_discharge_while_laptop_active() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store);
    c.register_device("laptop", DeviceKind::Laptop, t0());
    c.register_device("phone", DeviceKind::Phone, t0());

    c.process_sample(&sample_at("laptop", 0, 50.0, true), t0());
    let effects = c.process_sample(&sample_at("phone", 10, 95.0, true), t0() + Duration::seconds(10));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::AlertDecided { .. })));
    c.dismiss("phone").unwrap();
    assert_eq!(c.alert_state("phone"), Some(AlertState::Dismissed));

    // The phone unplugs and drains below threshold while the charging
    // laptop owns alerting. The dismissal must still clear.
    c.process_sample(&sample_at("phone", 60, 70.0, false), t0() + Duration::seconds(60));
    assert_eq!(c.active_device().as_deref(), Some("laptop"));
    assert_eq!(c.alert_state("phone"), Some(AlertState::Armed));

    // Plugged back in and past threshold, the phone is the charging phone
    // again and fires a fresh alert.
    let effects = c.process_sample(&sample_at("phone", 120, 96.0, true), t0() + Duration::seconds(120));
    assert_eq!(c.active_device().as_deref(), Some("phone"));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::AlertDecided { kind: AlertKind::ThresholdReached, .. })));
}

#[test]
fn test_flush_closes_open_cycles_for_every_device() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store.clone());
    c.register_device("laptop", DeviceKind::Laptop, t0());
    c.register_device("phone", DeviceKind::Phone, t0());

    c.process_sample(&sample_at("laptop", 0, 40.0, true), t0());
    c.process_sample(&sample_at("laptop", 120, 42.0, true), t0() + Duration::seconds(120));
    c.process_sample(&sample_at("phone", 0, 60.0, true), t0());
    c.process_sample(&sample_at("phone", 120, 61.0, true), t0() + Duration::seconds(120));

    let effects = c.flush(t0() + Duration::seconds(150));
    let closed: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::CycleClosed(_)))
        .collect();
    assert_eq!(closed.len(), 2);
    assert_eq!(store.cycle_count("laptop"), 1);
    assert_eq!(store.cycle_count("phone"), 1);
}

#[test]
fn test_cycle_close_triggers_time_to_empty_prediction() {
    let store = Arc::new(MemoryStore::new());
    let base: i64 = 100 * 3600;

    // Recent discharge history: five runs at 0.5%/min inside the training
    // window, each long enough to count as a segment.
    let mut offset = base - 40_000;
    for start in [90.0_f32, 80.0, 70.0, 60.0, 50.0] {
        store.append_sample(&sample_at("laptop", offset, start, false)).unwrap();
        store
            .append_sample(&sample_at("laptop", offset + 600, start - 5.0, false))
            .unwrap();
        store
            .append_sample(&sample_at("laptop", offset + 660, start - 5.0, true))
            .unwrap();
        offset += 720;
    }

    let mut c = coordinator_with(store);
    c.register_device("laptop", DeviceKind::Laptop, t0());

    // A charge session ends; the close re-scores and predicts runtime from
    // the unplug sample.
    c.process_sample(&sample_at("laptop", base, 50.0, true), t0() + Duration::seconds(base));
    c.process_sample(
        &sample_at("laptop", base + 600, 60.0, true),
        t0() + Duration::seconds(base + 600),
    );
    let effects = c.process_sample(
        &sample_at("laptop", base + 660, 60.0, false),
        t0() + Duration::seconds(base + 660),
    );

    assert!(effects.iter().any(|e| matches!(e, Effect::CycleClosed(_))));
    let prediction = effects
        .iter()
        .find_map(|e| match e {
            Effect::PredictionUpdated(p) => Some(p),
            _ => None,
        })
        .expect("five discharge segments train a model");
    assert_eq!(prediction.device_id, "laptop");
    assert_eq!(prediction.basis_cycle_count, 5);
    // 60% at 0.5%/min: two hours of runtime.
    assert!((prediction.predicted_seconds - 7200).abs() <= 60);
}

#[test]
fn test_unknown_sample_registers_device() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store);
    assert!(c.device_ids().is_empty());

    c.process_sample(&sample_at("walk-in", 0, 50.0, true), t0());
    assert_eq!(c.device_ids(), vec!["walk-in".to_string()]);
    assert_eq!(c.alert_state("walk-in"), Some(AlertState::Armed));
}

#[test]
fn test_set_threshold_rejects_out_of_range() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store);
    c.register_device("laptop", DeviceKind::Laptop, t0());

    assert!(c.set_threshold("laptop", 0, t0()).is_err());
    assert!(c.set_threshold("laptop", 101, t0()).is_err());
    assert!(c.set_threshold("laptop", 80, t0()).is_ok());
    assert!(c.set_threshold("ghost", 80, t0()).is_err());
}

#[test]
fn test_snooze_and_dismiss_require_registered_device() {
    let store = Arc::new(MemoryStore::new());
    let mut c = coordinator_with(store);
    assert!(c.snooze("ghost", t0()).is_err());
    assert!(c.dismiss("ghost").is_err());
}
