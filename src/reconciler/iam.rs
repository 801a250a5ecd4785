//! # IAM Grant Resource
//!
//! A single `(target, role, member)` binding. Present means the member is
//! already listed in the role's unconditional binding; creating it is a
//! read-modify-write of the target's policy that echoes the policy `etag`,
//! so a concurrent edit fails instead of being overwritten.

use super::Resource;
use crate::error::Result;
use crate::provider::{ControlPlane, IamTarget};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamGrant {
    pub target: IamTarget,
    pub role: &'static str,
    pub member: String,
}

impl IamGrant {
    #[must_use]
    pub fn new(target: IamTarget, role: &'static str, member: impl Into<String>) -> Self {
        Self {
            target,
            role,
            member: member.into(),
        }
    }
}

#[async_trait]
impl Resource for IamGrant {
    type State = ();

    fn kind(&self) -> &'static str {
        "iam_binding"
    }

    fn id(&self) -> String {
        format!("{} {} {}", self.target, self.role, self.member)
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<()>> {
        match control_plane.get_iam_policy(&self.target).await {
            Ok(policy) => Ok(policy.has_member(self.role, &self.member).then_some(())),
            // Target not created yet (plan mode): nothing is granted on it
            Err(e) if e.is_not_found() => {
                debug!(resource = %self.target, "Policy target does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<()> {
        let mut policy = control_plane.get_iam_policy(&self.target).await?;
        if policy.add_member(self.role, &self.member) {
            control_plane.set_iam_policy(&self.target, &policy).await?;
        }
        Ok(())
    }
}
