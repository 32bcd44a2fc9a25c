//! Async monitor runner
//!
//! Spawns one polling task per device source. Each task reads its source
//! under a timeout (a stalled device never blocks the others), runs the
//! coordinator pipeline while holding the shared lock, hands any decided
//! alerts to the notifier, and sleeps for the adaptive delay. Commands
//! arrive on a channel and are applied between ticks. Shutdown is a watch
//! flag: in-flight ticks complete and open cycles are flushed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::coordinator::{DeviceCoordinator, Effect};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result, SourceError};
use crate::notify::Notifier;
use crate::source::DeviceSource;
use crate::store::Store;

/// How long a single source read may take before the tick is skipped
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Command channel depth
const COMMAND_BUFFER: usize = 16;

/// User-driven alert commands
#[derive(Debug, Clone)]
pub enum MonitorCommand {
    Snooze { device_id: String },
    Dismiss { device_id: String },
    SetThreshold { device_id: String, threshold_percent: u8 },
}

/// Builder for a running monitor
pub struct Monitor {
    config: MonitorConfig,
    coordinator: Arc<Mutex<DeviceCoordinator>>,
    notifier: Arc<dyn Notifier>,
    sources: Vec<Arc<dyn DeviceSource>>,
}

impl Monitor {
    /// Create a monitor. The configuration is validated here; the core only
    /// ever sees accepted values.
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = Arc::new(Mutex::new(DeviceCoordinator::new(config.clone(), store)));
        Ok(Self {
            config,
            coordinator,
            notifier,
            sources: Vec::new(),
        })
    }

    pub fn add_source(&mut self, source: Arc<dyn DeviceSource>) {
        self.sources.push(source);
    }

    /// Spawn the polling tasks and the command loop.
    pub async fn start(self) -> Result<RunningMonitor> {
        if self.sources.is_empty() {
            return Err(MonitorError::Runner("no device sources registered".into()));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        // Register every device up front so commands can address them
        // before the first sample arrives.
        {
            let mut coordinator = self.coordinator.lock().await;
            let now = Utc::now();
            for source in &self.sources {
                coordinator.register_device(source.device_id(), source.kind(), now);
            }
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        for source in &self.sources {
            tasks.push(tokio::spawn(poll_loop(
                Arc::clone(source),
                Arc::clone(&self.coordinator),
                Arc::clone(&self.notifier),
                self.config.poll_interval(),
                shutdown_rx.clone(),
            )));
        }

        tasks.push(tokio::spawn(command_loop(
            command_rx,
            Arc::clone(&self.coordinator),
            Arc::clone(&self.notifier),
            shutdown_rx,
        )));

        log::info!("monitor started with {} device(s)", self.sources.len());

        Ok(RunningMonitor {
            coordinator: self.coordinator,
            notifier: self.notifier,
            command_tx,
            shutdown_tx,
            tasks,
        })
    }
}

/// Handle to a started monitor
pub struct RunningMonitor {
    coordinator: Arc<Mutex<DeviceCoordinator>>,
    notifier: Arc<dyn Notifier>,
    command_tx: mpsc::Sender<MonitorCommand>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningMonitor {
    /// Sender for snooze/dismiss/threshold commands.
    pub fn commands(&self) -> mpsc::Sender<MonitorCommand> {
        self.command_tx.clone()
    }

    /// Shared coordinator, for status queries.
    pub fn coordinator(&self) -> Arc<Mutex<DeviceCoordinator>> {
        Arc::clone(&self.coordinator)
    }

    /// Stop polling: in-flight ticks complete, no new ticks start, and open
    /// cycles are flushed so history is not silently truncated.
    pub async fn shutdown(self) {
        log::info!("monitor shutting down");
        let _ = self.shutdown_tx.send(true);
        join_all(self.tasks).await;

        let mut coordinator = self.coordinator.lock().await;
        let effects = coordinator.flush(Utc::now());
        drop(coordinator);
        dispatch_effects(&effects, self.notifier.as_ref());
        log::info!("monitor stopped");
    }
}

/// Per-device polling loop.
async fn poll_loop(
    source: Arc<dyn DeviceSource>,
    coordinator: Arc<Mutex<DeviceCoordinator>>,
    notifier: Arc<dyn Notifier>,
    base_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let device_id = source.device_id().to_string();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // The read happens outside the coordinator lock; only the
        // synchronous pipeline holds it.
        let reading = match timeout(READ_TIMEOUT, source.read()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(READ_TIMEOUT.as_millis() as u64)),
        };

        let delay = {
            let mut coordinator = coordinator.lock().await;
            match reading {
                Ok(sample) => {
                    let effects = coordinator.process_sample(&sample, Utc::now());
                    let delay = coordinator.next_delay(&sample);
                    drop(coordinator);
                    dispatch_effects(&effects, notifier.as_ref());
                    delay
                }
                Err(e) => {
                    coordinator.note_unavailable(&device_id, &e);
                    base_interval
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
    log::debug!("[{}] poll loop stopped", device_id);
}

/// Applies user commands between ticks.
async fn command_loop(
    mut command_rx: mpsc::Receiver<MonitorCommand>,
    coordinator: Arc<Mutex<DeviceCoordinator>>,
    notifier: Arc<dyn Notifier>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        let mut guard = coordinator.lock().await;
        let result = match &command {
            MonitorCommand::Snooze { device_id } => guard.snooze(device_id, Utc::now()).map(|_| Vec::new()),
            MonitorCommand::Dismiss { device_id } => guard.dismiss(device_id).map(|_| Vec::new()),
            MonitorCommand::SetThreshold {
                device_id,
                threshold_percent,
            } => guard.set_threshold(device_id, *threshold_percent, Utc::now()),
        };
        drop(guard);

        match result {
            Ok(effects) => dispatch_effects(&effects, notifier.as_ref()),
            Err(e) => log::warn!("command {:?} rejected: {}", command, e),
        }
    }
}

/// Execute decided effects. Delivery is best-effort: the decision already
/// happened, a notifier problem only gets logged.
fn dispatch_effects(effects: &[Effect], notifier: &dyn Notifier) {
    for effect in effects {
        match effect {
            Effect::AlertDecided {
                device_id,
                kind,
                payload,
            } => notifier.deliver(device_id, *kind, payload),
            Effect::CycleClosed(cycle) => {
                log::debug!(
                    "[{}] recorded cycle ending at {:?}",
                    cycle.device_id,
                    cycle.end_time
                );
            }
            Effect::PredictionUpdated(prediction) => {
                log::info!(
                    "[{}] est. {}min to target (confidence {:.0}%, {} cycles)",
                    prediction.device_id,
                    prediction.predicted_seconds / 60,
                    prediction.confidence * 100.0,
                    prediction.basis_cycle_count
                );
            }
        }
    }
}
