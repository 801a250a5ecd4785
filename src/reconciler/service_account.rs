//! # Service Account Resource
//!
//! Service identities are created once and reused. There is no update path:
//! display name and description are informational and never patched.

use super::Resource;
use crate::config::ServiceAccountSpec;
use crate::error::Result;
use crate::provider::{ControlPlane, Scope, ServiceAccount};
use async_trait::async_trait;

#[derive(Debug)]
pub struct ServiceAccountResource<'a> {
    scope: &'a Scope,
    spec: &'a ServiceAccountSpec,
}

impl<'a> ServiceAccountResource<'a> {
    #[must_use]
    pub fn new(scope: &'a Scope, spec: &'a ServiceAccountSpec) -> Self {
        Self { scope, spec }
    }

    #[must_use]
    pub fn email(&self) -> String {
        self.scope.service_account_email(&self.spec.account_id)
    }
}

#[async_trait]
impl Resource for ServiceAccountResource<'_> {
    type State = ServiceAccount;

    fn kind(&self) -> &'static str {
        "service_account"
    }

    fn id(&self) -> String {
        self.spec.account_id.clone()
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<ServiceAccount>> {
        control_plane
            .get_service_account(&self.scope.project_id, &self.email())
            .await
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<ServiceAccount> {
        let account = ServiceAccount {
            display_name: self.spec.display_name.clone(),
            description: self.spec.description.clone(),
            ..ServiceAccount::default()
        };
        control_plane
            .create_service_account(&self.scope.project_id, &self.spec.account_id, &account)
            .await
    }
}
