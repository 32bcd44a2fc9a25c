//! ChargeGuard demo binary
//!
//! Wires a simulated laptop and phone into the monitor and runs until
//! Ctrl+C. Useful for watching the alert and prediction pipeline without
//! real hardware.

use std::sync::Arc;

use chargeguard::device::DeviceKind;
use chargeguard::logging::init_logger;
use chargeguard::monitor::Monitor;
use chargeguard::notify::LogNotifier;
use chargeguard::source::SimulatedSource;
use chargeguard::store::MemoryStore;
use chargeguard::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger(log::LevelFilter::Info);

    let config = MonitorConfig::load().unwrap_or_else(|e| {
        log::warn!("using default configuration: {}", e);
        MonitorConfig::default()
    });

    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(LogNotifier);

    let laptop = Arc::new(
        SimulatedSource::new("laptop-0", DeviceKind::Laptop, 45.0).with_step(1.5),
    );
    laptop.set_charging(true);
    let phone = Arc::new(SimulatedSource::new("phone-0", DeviceKind::Phone, 88.0));

    let mut monitor = Monitor::new(config, store, notifier)?;
    monitor.add_source(laptop);
    monitor.add_source(phone);

    let running = monitor.start().await?;
    log::info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    running.shutdown().await;
    Ok(())
}
