//! Tracing setup for binaries built on Parlor.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::ParlorError;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` when the variable is unset or invalid.
///
/// # Errors
/// [`ParlorError::Config`] if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), ParlorError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| ParlorError::Config(format!("tracing already initialised: {e}")))
}
