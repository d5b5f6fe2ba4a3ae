//! Tracing setup for test binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `END2END_LOG=end2end=debug`.
pub const LOG_ENV: &str = "END2END_LOG";

/// Install a fmt subscriber that writes through the test harness's captured
/// output. The filter comes from `END2END_LOG`, then `RUST_LOG`, then
/// defaults to `warn`. Safe to call from every test; only the first call
/// installs anything.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
