//! Tracing setup for binaries and tests that embed the pipeline

use std::io;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter: pipeline progress at info, merge decisions hidden
pub const DEFAULT_DIRECTIVE: &str = "info,medrecon_reconciler=warn";

/// Install a stderr subscriber filtered by `RUST_LOG`, falling back to `default_directive`
///
/// Returns false when a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
