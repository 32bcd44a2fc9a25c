//! Notification collaborator interface
//!
//! Delivery mechanics (toasts, SMS, chat bots) live outside the core. The
//! core decides alerts; a `Notifier` delivers them best-effort. A failed
//! delivery never rolls back an alert decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of alert is being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// Charge percentage reached the configured threshold while charging
    ThresholdReached,

    /// Battery health classified Degraded or Overheat
    HealthWarning,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::ThresholdReached => write!(f, "threshold reached"),
            AlertKind::HealthWarning => write!(f, "health warning"),
        }
    }
}

/// Context delivered alongside an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Percentage at the moment the alert was decided
    pub percentage: f32,

    /// Threshold in force when the alert was decided
    pub threshold_percent: u8,

    /// When the qualifying condition was first reached
    pub reached_at: DateTime<Utc>,

    /// Health score, for health warnings
    pub health_score: Option<f32>,

    /// Free-form detail line for the delivery channel
    pub detail: Option<String>,
}

/// Best-effort alert delivery
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Errors are the notifier's own concern; the core
    /// logs and moves on.
    fn deliver(&self, device_id: &str, kind: AlertKind, payload: &AlertPayload);
}

/// Notifier that writes alerts to the log; the demo binary's channel.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, device_id: &str, kind: AlertKind, payload: &AlertPayload) {
        log::warn!(
            "[{}] {}: {:.0}% (threshold {}%){}",
            device_id,
            kind,
            payload.percentage,
            payload.threshold_percent,
            payload
                .detail
                .as_deref()
                .map(|d| format!(" - {}", d))
                .unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_kind_display() {
        assert_eq!(AlertKind::ThresholdReached.to_string(), "threshold reached");
        assert_eq!(AlertKind::HealthWarning.to_string(), "health warning");
    }

    #[test]
    fn test_log_notifier_does_not_panic() {
        let payload = AlertPayload {
            percentage: 81.0,
            threshold_percent: 80,
            reached_at: Utc::now(),
            health_score: None,
            detail: Some("demo".to_string()),
        };
        LogNotifier.deliver("laptop", AlertKind::ThresholdReached, &payload);
    }
}
