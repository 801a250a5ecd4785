//! Bots Provisioner Library
//!
//! Idempotent provisioning of the notification bots on Google Cloud:
//! two HTTP functions, their invoker identities and IAM grants, the
//! scheduler jobs that poll them, and the Pub/Sub push pipeline that feeds
//! the e-mail bot.
//!
//! - [`config`]: declared deployment and runtime knobs
//! - [`provider`]: control plane boundary and its GCP REST implementation
//! - [`source`]: packaging bot source trees
//! - [`reconciler`]: per-resource converge logic
//! - [`deployment`]: the ordered, fail-fast run over all resources

pub mod config;
pub mod constants;
pub mod deployment;
pub mod error;
pub mod observability;
pub mod provider;
pub mod reconciler;
pub mod source;

pub use deployment::{Deployment, RunReport};
pub use error::{ProvisionError, Result};
pub use reconciler::{Action, Mode};
