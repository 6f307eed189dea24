//! # Tracing Setup
//!
//! Binaries call [`init_tracing`] once at startup. Library code only emits
//! events and never installs a subscriber.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages everywhere
//! - `RUST_LOG=meridian=trace` - Trace for the meridian crates only
//! - Default: `warn,meridian=info`

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "warn,meridian=info";

/// Installs the global fmt subscriber with the default filter.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// Installs the global fmt subscriber, falling back to `default_filter`.
///
/// A second call is a no-op, so tests and binaries can both call it.
pub fn init_tracing_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing_with("meridian=debug");
        init_tracing();
        tracing::info!(target: "meridian_ops::telemetry", "still running");
    }
}
