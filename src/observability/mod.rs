//! # Observability
//!
//! - `logging`: tracing subscriber setup
//! - `metrics`: Prometheus metrics for runs, API calls and resource actions

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
