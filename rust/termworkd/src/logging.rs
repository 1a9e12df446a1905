//! Tracing setup. Output goes to stderr; stdout carries IPC responses.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

const ENV_FILTER_VAR: &str = "TERMWORK_LOG";
const DEFAULT_FILTER: &str = "info";

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(String),
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init() -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::SetGlobal(e.to_string()))?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_FILTER_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
