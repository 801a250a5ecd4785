//! # Runtime Configuration
//!
//! Process-level settings loaded from environment variables. These tune how
//! the provisioner talks to the control plane, not what it provisions (that
//! lives in [`DeploymentConfig`](super::DeploymentConfig)).

use crate::constants::{
    DEFAULT_CLOUDFUNCTIONS_ENDPOINT, DEFAULT_CLOUDSCHEDULER_ENDPOINT, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_IAM_ENDPOINT, DEFAULT_OPERATION_POLL_INTERVAL_MS, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_PUBSUB_ENDPOINT, DEFAULT_RUN_ENDPOINT, DEFAULT_SECRETMANAGER_ENDPOINT,
};
use std::time::Duration;

/// Base URLs of every API the provisioner calls.
///
/// Overridable per service so contract tests can route calls to a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub cloudfunctions: String,
    pub run: String,
    pub iam: String,
    pub cloudscheduler: String,
    pub pubsub: String,
    pub secretmanager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cloudfunctions: DEFAULT_CLOUDFUNCTIONS_ENDPOINT.to_string(),
            run: DEFAULT_RUN_ENDPOINT.to_string(),
            iam: DEFAULT_IAM_ENDPOINT.to_string(),
            cloudscheduler: DEFAULT_CLOUDSCHEDULER_ENDPOINT.to_string(),
            pubsub: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            secretmanager: DEFAULT_SECRETMANAGER_ENDPOINT.to_string(),
        }
    }
}

impl Endpoints {
    /// Route every service to one base URL (a single mock server)
    #[must_use]
    pub fn all(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            cloudfunctions: base.clone(),
            run: base.clone(),
            iam: base.clone(),
            cloudscheduler: base.clone(),
            pubsub: base.clone(),
            secretmanager: base,
        }
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cloudfunctions: env_var_or_default_str(
                "CLOUDFUNCTIONS_ENDPOINT",
                &defaults.cloudfunctions,
            ),
            run: env_var_or_default_str("RUN_ENDPOINT", &defaults.run),
            iam: env_var_or_default_str("IAM_ENDPOINT", &defaults.iam),
            cloudscheduler: env_var_or_default_str(
                "CLOUDSCHEDULER_ENDPOINT",
                &defaults.cloudscheduler,
            ),
            pubsub: env_var_or_default_str("PUBSUB_ENDPOINT", &defaults.pubsub),
            secretmanager: env_var_or_default_str(
                "SECRETMANAGER_ENDPOINT",
                &defaults.secretmanager,
            ),
        }
    }
}

/// Provisioner runtime configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// `RUST_LOG` takes precedence when set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
    /// Delay between long-running operation polls (milliseconds)
    pub operation_poll_interval_ms: u64,
    /// Give up on a long-running operation after this many seconds
    pub operation_timeout_secs: u64,
    /// Per-request HTTP timeout (seconds)
    pub http_timeout_secs: u64,
    /// API base URLs
    pub endpoints: Endpoints,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            log_enable_color: true,
            operation_poll_interval_ms: DEFAULT_OPERATION_POLL_INTERVAL_MS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            endpoints: Endpoints::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            log_enable_color: env_var_or_default_bool("LOG_ENABLE_COLOR", true),
            operation_poll_interval_ms: env_var_or_default(
                "OPERATION_POLL_INTERVAL_MS",
                DEFAULT_OPERATION_POLL_INTERVAL_MS,
            ),
            operation_timeout_secs: env_var_or_default(
                "OPERATION_TIMEOUT_SECS",
                DEFAULT_OPERATION_TIMEOUT_SECS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            endpoints: Endpoints::from_env(),
        }
    }

    /// Get operation poll interval duration
    #[must_use]
    pub fn operation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.operation_poll_interval_ms)
    }

    /// Get operation timeout duration
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Get HTTP request timeout duration
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
