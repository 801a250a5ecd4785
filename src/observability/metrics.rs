//! # Metrics
//!
//! Prometheus metrics for a provisioning run.
//!
//! ## Metrics Exposed
//!
//! - `bots_provisioner_runs_total` - Total number of runs
//! - `bots_provisioner_run_errors_total` - Total number of failed runs
//! - `bots_provisioner_run_duration_seconds` - Duration of a full run
//! - `bots_provisioner_api_calls_total` - Control plane calls by service
//! - `bots_provisioner_api_call_duration_seconds` - Control plane call duration by service
//! - `bots_provisioner_api_errors_total` - Failed control plane calls by service
//! - `bots_provisioner_resource_actions_total` - Reconcile outcomes by resource kind and action
//!
//! The process is short-lived, so metrics are written once at the end of a
//! run in the text exposition format (see [`write_textfile`]).

use anyhow::{Context, Result};
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder,
};
use std::path::Path;
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RUNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("bots_provisioner_runs_total", "Total number of provisioning runs")
        .expect("Failed to create RUNS_TOTAL metric - this should never happen")
});

static RUN_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bots_provisioner_run_errors_total",
        "Total number of provisioning runs that aborted",
    )
    .expect("Failed to create RUN_ERRORS_TOTAL metric - this should never happen")
});

static RUN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "bots_provisioner_run_duration_seconds",
            "Duration of a provisioning run in seconds",
        )
        .buckets(vec![1.0, 5.0, 30.0, 60.0, 180.0, 300.0, 600.0, 1200.0]),
    )
    .expect("Failed to create RUN_DURATION metric - this should never happen")
});

static API_CALLS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "bots_provisioner_api_calls_total",
            "Total number of control plane API calls",
        ),
        &["service"],
    )
    .expect("Failed to create API_CALLS_TOTAL metric - this should never happen")
});

static API_CALL_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "bots_provisioner_api_call_duration_seconds",
            "Duration of control plane API calls in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]),
        &["service"],
    )
    .expect("Failed to create API_CALL_DURATION metric - this should never happen")
});

static API_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "bots_provisioner_api_errors_total",
            "Total number of failed control plane API calls",
        ),
        &["service"],
    )
    .expect("Failed to create API_ERRORS_TOTAL metric - this should never happen")
});

static RESOURCE_ACTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "bots_provisioner_resource_actions_total",
            "Reconcile outcomes by resource kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create RESOURCE_ACTIONS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
/// Register all metrics with the process registry. Call once at startup.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RUN_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RUN_DURATION.clone()))?;
    REGISTRY.register(Box::new(API_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(API_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(API_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCE_ACTIONS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_runs() {
    RUNS_TOTAL.inc();
}

pub fn increment_run_errors() {
    RUN_ERRORS_TOTAL.inc();
}

pub fn observe_run_duration(duration: f64) {
    RUN_DURATION.observe(duration);
}

pub fn record_api_call(service: &str, duration: f64) {
    API_CALLS_TOTAL.with_label_values(&[service]).inc();
    API_CALL_DURATION
        .with_label_values(&[service])
        .observe(duration);
}

pub fn increment_api_errors(service: &str) {
    API_ERRORS_TOTAL.with_label_values(&[service]).inc();
}

pub fn record_resource_action(kind: &str, action: &str) {
    RESOURCE_ACTIONS_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

/// Render the registry in the Prometheus text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}

/// Write the registry to `path` for a node-exporter textfile collector.
/// The file is written next to its final name and renamed into place.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn write_textfile(path: &Path) -> Result<()> {
    let rendered = render()?;
    let staging = path.with_extension("prom.tmp");
    std::fs::write(&staging, rendered)
        .with_context(|| format!("Failed to write metrics to {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textfile_contains_recorded_actions() {
        register_metrics().unwrap();
        record_resource_action("metrics_probe", "updated");
        record_api_call("metrics_probe", 0.2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisioner.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().any(|line| {
            line.starts_with("bots_provisioner_resource_actions_total{")
                && line.contains(r#"kind="metrics_probe""#)
                && line.contains(r#"action="updated""#)
                && line.ends_with(" 1")
        }));
        assert!(text.contains(r#"bots_provisioner_api_calls_total{service="metrics_probe"} 1"#));
        assert!(!dir.path().join("provisioner.prom.tmp").exists());
    }
}
