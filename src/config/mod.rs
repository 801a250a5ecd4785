//! # Configuration
//!
//! - `deployment`: declared desired state (YAML file or built-in default)
//! - `runtime`: process knobs from environment variables
//! - `validation`: checks run before any API call

pub mod deployment;
pub mod runtime;
pub mod validation;

pub use deployment::{
    expand_project, DeploymentConfig, FunctionSpec, JobSpec, SecretBinding, ServiceAccountSpec,
    SubscriptionSpec, TopicSpec,
};
pub use runtime::{Endpoints, ProvisionerConfig};
pub use validation::{check_sources, validate};
