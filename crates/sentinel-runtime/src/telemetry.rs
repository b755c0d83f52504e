//! Tracing bootstrap

use tracing_subscriber::EnvFilter;

use sentinel_core::SystemConfig;

/// Install the global tracing subscriber from the configured log level.
/// `RUST_LOG` still wins when set; calling twice is harmless.
pub fn init_telemetry(config: &SystemConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
