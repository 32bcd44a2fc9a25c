//! Structured logging for chargeguard
//!
//! Wraps `env_logger` with a consistent timestamped format so monitor output
//! lines up with the timestamps recorded in samples and cycles.

use std::io::Write;
use std::sync::Once;

use chrono::Local;
use log::LevelFilter;

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Global initialization guard
static INIT_LOGGER: Once = Once::new();

/// Initialize the logger at the given default level.
///
/// `RUST_LOG` still overrides the default. Safe to call more than once; only
/// the first call takes effect.
pub fn init_logger(default_level: LevelFilter) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .filter_level(default_level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}] {}",
                    Local::now().format(TIMESTAMP_FORMAT),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .parse_default_env();
        // Ignore the error if a logger was already installed by the host.
        let _ = builder.try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_idempotent() {
        init_logger(LevelFilter::Debug);
        init_logger(LevelFilter::Trace);
        log::debug!("logger initialized twice without panic");
    }
}
