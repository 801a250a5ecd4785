//! # Logging
//!
//! `tracing-subscriber` setup. `RUST_LOG` takes precedence over
//! `LOG_LEVEL`; `LOG_FORMAT=json` switches to one JSON object per line.
//! Logs go to stderr so stdout carries only the run report.

use crate::config::ProvisionerConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Default filter directive for a `LOG_LEVEL` value
fn default_directive(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    format!("bots_provisioner={level},provisioner={level},warn")
}

/// Install the global subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed
pub fn init_logging(config: &ProvisionerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init()
    } else {
        builder.with_ansi(config.log_enable_color).try_init()
    };
    result.map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
