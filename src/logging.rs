//! Tracing setup. Grounded on `yaleman-goatns`'s
//! `build_loglevel_filter_layer`, trimmed of its OpenTelemetry layer
//! since this crate has no tracing backend to export to — just an
//! `EnvFilter` over a plain formatting subscriber.

use tracing_subscriber::EnvFilter;

/// Builds the `RUST_LOG`-driven filter, defaulting to `default_level`
/// when the environment variable is unset.
pub fn build_loglevel_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs a global `tracing` subscriber. Safe to call more than
/// once; later calls are no-ops.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_loglevel_filter(default_level))
        .try_init();
}
