//! Logging configuration for gatecheck
//!
//! Plain tracing output, captured per test by the test harness.
//!
//! # Example
//!
//! ```no_run
//! use gatecheck::telemetry::init_logging;
//!
//! init_logging();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter variable checked before `RUST_LOG`
pub const LOG_ENV: &str = "GATECHECK_LOG";

const DEFAULT_FILTER: &str = "info";

/// Initialize logging with tracing-subscriber
///
/// Filter comes from `GATECHECK_LOG`, then `RUST_LOG`, else `info`.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
