// ============================================
// File: crates/tunhub-server/src/logging.rs
// ============================================
//! # Logging Setup
//!
//! ## Creation Reason
//! Builds the process tracing subscriber from `logging.level`, with
//! `RUST_LOG` taking precedence when it is set.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A process gets exactly one global subscriber. Load the configuration
//!   first, then call `init_logging` once; a second call is an error
//! - Engine code never touches the global subscriber; it only logs into
//!   the spans it is given
//!
//! ## Last Modified
//! v0.1.0 - Initial logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Result, ServerError};

/// Builds the level filter.
///
/// `env` is the value of `RUST_LOG`, if any; when present and parseable it
/// wins over `level`.
///
/// # Errors
/// Returns `ConfigInvalid` if neither `env` nor `level` is a valid filter.
pub fn build_filter(level: &str, env: Option<&str>) -> Result<EnvFilter> {
    if let Some(filter) = env.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return Ok(filter);
    }

    EnvFilter::try_new(level)
        .map_err(|e| ServerError::config_invalid("logging.level", e.to_string()))
}

/// Installs the global subscriber at `level`, honouring `RUST_LOG`.
///
/// # Errors
/// Returns an error if the level is invalid or a subscriber is already
/// installed.
pub fn init_logging(level: &str) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    install(build_filter(level, env.as_deref())?)
}

fn install(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| ServerError::internal(format!("logging already initialized: {e}")))
}

// ============================================
// Tests
// ============================================
