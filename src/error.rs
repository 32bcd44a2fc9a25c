//! Error types for the chargeguard monitoring core

use thiserror::Error;

/// Top-level monitor error type
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Device could not be read this tick
    #[error("source unavailable: {0}")]
    Source(#[from] SourceError),

    /// History store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration rejected at the boundary
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Predictor or analyzer precondition not met
    #[error("insufficient history: have {have} cycles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// Unknown device referenced by a command
    #[error("device not registered: {0}")]
    DeviceNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Monitor runner error
    #[error("monitor error: {0}")]
    Runner(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors produced by a `DeviceSource` collaborator
#[derive(Debug, Error)]
pub enum SourceError {
    /// Device unreachable or not connected this tick
    #[error("device unreachable: {0}")]
    Unavailable(String),

    /// Read started but did not complete in time
    #[error("read timed out after {0} ms")]
    Timeout(u64),

    /// Device returned an unparseable or out-of-range reading
    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

/// Errors produced by a `Store` collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    /// Write could not be persisted; callers buffer and retry
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// Read could not be served
    #[error("read failed: {0}")]
    ReadFailure(String),
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("threshold_percent must be 1-100, got {0}")]
    ThresholdOutOfRange(u8),

    #[error("poll_interval_seconds must be positive")]
    NonPositiveInterval,

    #[error("min_poll_interval_seconds must not exceed poll_interval_seconds")]
    MinIntervalAboveBase,

    #[error("debounce_margin must be non-negative, got {0}")]
    NegativeDebounceMargin(f32),

    #[error("failed to read configuration: {0}")]
    Load(String),

    #[error("failed to write configuration: {0}")]
    Save(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_error_display() {
        let err = MonitorError::InsufficientHistory { have: 4, need: 5 };
        assert_eq!(err.to_string(), "insufficient history: have 4 cycles, need 5");
    }

    #[test]
    fn test_source_error_conversion() {
        let err: MonitorError = SourceError::Unavailable("phone-01".to_string()).into();
        assert!(matches!(err, MonitorError::Source(_)));
        assert_eq!(err.to_string(), "source unavailable: device unreachable: phone-01");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ThresholdOutOfRange(120);
        assert_eq!(err.to_string(), "threshold_percent must be 1-100, got 120");
    }
}
