//! Tracing subscriber setup for binaries and tests that embed the kernel.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;

/// Install a global `fmt` subscriber. `RUST_LOG` wins over the configured
/// filter.
///
/// Returns `false` when telemetry is disabled or a subscriber is already
/// installed.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    if !config.enabled {
        return false;
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(config.ansi))
        .try_init()
        .is_ok()
}
