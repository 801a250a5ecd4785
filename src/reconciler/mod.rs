//! # Reconciler
//!
//! One idempotent operation, [`ensure`], applied to every managed resource:
//!
//! 1. Observe live state (absent is not an error)
//! 2. Absent: create it
//! 3. Present: compute drift against the declared state
//! 4. Drift: update in place; no drift: do nothing
//!
//! Each resource kind only describes how to observe, compare, create and
//! update itself through [`Resource`]. In [`Mode::Plan`] steps 2 and 4 are
//! reported but not performed, so a plan never mutates anything.

pub mod function;
pub mod iam;
pub mod pubsub;
pub mod scheduler;
pub mod service_account;

pub use function::{FunctionEndpoint, FunctionResource};
pub use iam::IamGrant;
pub use pubsub::{SubscriptionResource, TopicResource};
pub use scheduler::JobResource;
pub use service_account::ServiceAccountResource;

use crate::error::{ProvisionError, Result};
use crate::observability::metrics;
use crate::provider::ControlPlane;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, info_span, Instrument};

/// Whether [`ensure`] may mutate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Apply,
    /// Read-only dry run
    Plan,
}

/// What [`ensure`] did (or would do) to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Unchanged,
    WouldCreate,
    WouldUpdate,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::WouldCreate => "would_create",
            Self::WouldUpdate => "would_update",
        }
    }

    /// True for anything other than [`Action::Unchanged`]
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`ensure`]
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<S> {
    pub action: Action,
    /// Fields that differed from the declared state
    pub drift: Vec<String>,
    /// Resulting live state; `None` only for [`Action::WouldCreate`]
    pub state: Option<S>,
}

/// A declared resource the reconciler can converge
#[async_trait]
pub trait Resource: Send + Sync {
    type State: Send;

    /// Resource kind used in logs, metrics and the run report
    fn kind(&self) -> &'static str;

    /// Human-readable identifier, unique within its kind
    fn id(&self) -> String;

    /// Read live state. Absence is `Ok(None)`.
    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<Self::State>>;

    /// Names of the fields where `live` differs from the declared state
    fn drift(&self, _live: &Self::State) -> Vec<String> {
        Vec::new()
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<Self::State>;

    /// Bring `live` in line with the declared state. Only called with a
    /// non-empty `drift`; kinds without an update path never report drift.
    async fn update(
        &self,
        _control_plane: &dyn ControlPlane,
        live: Self::State,
        _drift: &[String],
    ) -> Result<Self::State> {
        Ok(live)
    }
}

/// Converge one resource
///
/// # Errors
/// Any provider error, wrapped in [`ProvisionError::StepFailed`] naming the
/// resource
pub async fn ensure<R>(
    resource: &R,
    control_plane: &dyn ControlPlane,
    mode: Mode,
) -> Result<Applied<R::State>>
where
    R: Resource + ?Sized,
{
    let kind = resource.kind();
    let id = resource.id();
    let span = info_span!("reconcile", resource.kind = kind, resource.id = %id);

    let outcome: Result<Applied<R::State>> = async {
        let Some(live) = resource.observe(control_plane).await? else {
            if mode == Mode::Plan {
                return Ok(Applied {
                    action: Action::WouldCreate,
                    drift: Vec::new(),
                    state: None,
                });
            }
            let state = resource.create(control_plane).await?;
            return Ok(Applied {
                action: Action::Created,
                drift: Vec::new(),
                state: Some(state),
            });
        };

        let drift = resource.drift(&live);
        if drift.is_empty() {
            debug!("In sync");
            return Ok(Applied {
                action: Action::Unchanged,
                drift,
                state: Some(live),
            });
        }

        info!(drift = %drift.join(","), "Drift detected");
        if mode == Mode::Plan {
            return Ok(Applied {
                action: Action::WouldUpdate,
                drift,
                state: Some(live),
            });
        }
        let state = resource.update(control_plane, live, &drift).await?;
        Ok(Applied {
            action: Action::Updated,
            drift,
            state: Some(state),
        })
    }
    .instrument(span)
    .await;
    let applied = outcome.map_err(|e| ProvisionError::step(kind, id.clone(), e))?;

    metrics::record_resource_action(kind, applied.action.as_str());
    info!(
        resource.kind = kind,
        resource.id = %id,
        action = %applied.action,
        "Reconciled"
    );
    Ok(applied)
}

/// Push `field` onto `drift` when `differs`
pub(crate) fn note(drift: &mut Vec<String>, field: &str, differs: bool) {
    if differs {
        drift.push(field.to_string());
    }
}
