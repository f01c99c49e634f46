//! Diagnostic tracing for the tessent tools.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Command responses,
//! reports and output files never go through it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `debug` when `verbose` is set.
///
/// ```bash
/// RUST_LOG=tshell=debug backcone analyze s1196.yaml
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
