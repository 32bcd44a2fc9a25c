//! Threshold alert state machine
//!
//! One machine per device decides whether the stop-charging alert fires,
//! re-fires after a snooze, or stays quiet after a dismiss. The alert means
//! "unplug now": a discharging device above threshold never fires. A
//! decision is made exactly once per qualifying crossing; re-entering the
//! firing condition without an intervening drop below threshold is silent.
//!
//! Timers are wall-clock values checked lazily on the next sample rather
//! than scheduled callbacks.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::device::Sample;

/// Alert lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlertState {
    /// No qualifying condition observed yet
    Idle,

    /// Below threshold, watching for a crossing
    Armed,

    /// Crossed the threshold while charging; alert decided
    Firing,

    /// Quiet until the embedded wall-clock instant
    Snoozed(DateTime<Utc>),

    /// Quiet until the device is unplugged and drops below threshold
    Dismissed,
}

/// A fired alert decision
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub device_id: String,
    pub percentage: f32,
    pub threshold_percent: u8,
    /// Instant the qualifying condition was first reached
    pub reached_at: DateTime<Utc>,
}

/// Per-device threshold alert state machine
#[derive(Debug, Clone)]
pub struct ThresholdAlertStateMachine {
    device_id: String,
    threshold_percent: u8,
    snooze_duration: Duration,
    state: AlertState,
    reached_at: Option<DateTime<Utc>>,
    last_sample: Option<Sample>,
}

impl ThresholdAlertStateMachine {
    pub fn new(device_id: impl Into<String>, threshold_percent: u8, snooze_secs: u64) -> Self {
        Self {
            device_id: device_id.into(),
            threshold_percent,
            snooze_duration: Duration::seconds(snooze_secs as i64),
            state: AlertState::Idle,
            reached_at: None,
            last_sample: None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn threshold_percent(&self) -> u8 {
        self.threshold_percent
    }

    /// Instant the current alert condition was first reached, if any.
    pub fn reached_at(&self) -> Option<DateTime<Utc>> {
        self.reached_at
    }

    /// Observe a sample and decide. Returns a decision only on a qualifying
    /// transition into `Firing`.
    pub fn observe(&mut self, sample: &Sample, now: DateTime<Utc>) -> Option<AlertDecision> {
        self.last_sample = Some(sample.clone());
        let threshold = self.threshold_percent as f32;
        let at_or_above = sample.percentage >= threshold;

        // Expire a snooze lazily before evaluating.
        if let AlertState::Snoozed(until) = self.state {
            if now >= until {
                self.state = AlertState::Armed;
            }
        }

        match self.state {
            AlertState::Idle => {
                self.state = AlertState::Armed;
                if at_or_above && sample.is_charging {
                    return Some(self.fire(sample, now));
                }
                None
            }
            AlertState::Armed => {
                if at_or_above && sample.is_charging {
                    return Some(self.fire(sample, now));
                }
                None
            }
            AlertState::Firing => {
                if !at_or_above {
                    // Dropped back below: re-arm for the next crossing.
                    self.state = AlertState::Armed;
                    self.reached_at = None;
                }
                None
            }
            AlertState::Snoozed(_) => None,
            AlertState::Dismissed => {
                // Clearing a dismiss requires an actual unplug; a noisy dip
                // while still charging keeps it dismissed.
                if !sample.is_charging && !at_or_above {
                    self.state = AlertState::Armed;
                    self.reached_at = None;
                }
                None
            }
        }
    }

    /// Advance suppression and re-arm transitions without deciding an alert.
    ///
    /// Used while another device owns alerting: snooze expiry, dismiss
    /// clearing, and dropping below threshold still progress, but an Armed
    /// machine holds its crossing until this device is observed again.
    pub fn maintain(&mut self, sample: &Sample, now: DateTime<Utc>) {
        self.last_sample = Some(sample.clone());
        let below = sample.percentage < self.threshold_percent as f32;

        if let AlertState::Snoozed(until) = self.state {
            if now >= until {
                self.state = AlertState::Armed;
            }
        }

        match self.state {
            AlertState::Idle => self.state = AlertState::Armed,
            AlertState::Firing if below => {
                self.state = AlertState::Armed;
                self.reached_at = None;
            }
            AlertState::Dismissed if !sample.is_charging && below => {
                self.state = AlertState::Armed;
                self.reached_at = None;
            }
            _ => {}
        }
    }

    /// Snooze the active alert; quiet until `now + snooze_duration`.
    pub fn snooze(&mut self, now: DateTime<Utc>) {
        if self.state == AlertState::Firing {
            self.state = AlertState::Snoozed(now + self.snooze_duration);
            log::info!("[{}] alert snoozed for {}s", self.device_id, self.snooze_duration.num_seconds());
        }
    }

    /// Dismiss the active alert until the device unplugs and drops below
    /// threshold.
    pub fn dismiss(&mut self) {
        if matches!(self.state, AlertState::Firing | AlertState::Snoozed(_)) {
            self.state = AlertState::Dismissed;
            log::info!("[{}] alert dismissed until unplug", self.device_id);
        }
    }

    /// Change the threshold live. Re-evaluates immediately against the most
    /// recently observed sample: if the new threshold is already satisfied,
    /// fire now and record this moment as the reach time.
    pub fn set_threshold(&mut self, new_threshold: u8, now: DateTime<Utc>) -> Option<AlertDecision> {
        self.threshold_percent = new_threshold;
        let sample = self.last_sample.clone()?;

        let satisfied = sample.percentage >= new_threshold as f32 && sample.is_charging;
        match self.state {
            AlertState::Firing if !satisfied => {
                self.state = AlertState::Armed;
                self.reached_at = None;
                None
            }
            AlertState::Idle | AlertState::Armed | AlertState::Snoozed(_) | AlertState::Dismissed
                if satisfied =>
            {
                Some(self.fire(&sample, now))
            }
            _ => {
                if !satisfied && self.state != AlertState::Dismissed {
                    self.state = AlertState::Armed;
                }
                None
            }
        }
    }

    fn fire(&mut self, sample: &Sample, now: DateTime<Utc>) -> AlertDecision {
        self.state = AlertState::Firing;
        let reached = *self.reached_at.get_or_insert(now);
        AlertDecision {
            device_id: self.device_id.clone(),
            percentage: sample.percentage,
            threshold_percent: self.threshold_percent,
            reached_at: reached,
        }
    }
}
