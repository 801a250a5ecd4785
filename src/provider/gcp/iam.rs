//! IAM calls: service accounts and resource-level policies
//!
//! Resource policies live on the API that owns the resource, but every one of
//! them speaks the same `getIamPolicy` / `setIamPolicy` pair:
//!
//! | Target | Policy endpoint |
//! |---|---|
//! | Cloud Function | `cloudfunctions.googleapis.com/v2/{name}` |
//! | Cloud Run service | `run.googleapis.com/v2/{name}` |
//! | Pub/Sub topic | `pubsub.googleapis.com/v1/{name}` |
//! | Secret | `secretmanager.googleapis.com/v1/{name}` |

use super::client::GcpRestClient;
use crate::error::Result;
use crate::provider::model::{Policy, ServiceAccount};
use crate::provider::IamTarget;
use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, Instrument};

const IAM: &str = "iam";

/// Request body for creating a service account
///
/// API Reference: https://cloud.google.com/iam/docs/reference/rest/v1/projects.serviceAccounts/create
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateServiceAccountRequest<'a> {
    account_id: &'a str,
    service_account: &'a ServiceAccount,
}

impl GcpRestClient {
    fn policy_url(&self, target: &IamTarget) -> String {
        let base = match target {
            IamTarget::Function(_) => format!("{}/v2", self.endpoints.cloudfunctions),
            IamTarget::RunService(_) => format!("{}/v2", self.endpoints.run),
            IamTarget::Topic(_) => format!("{}/v1", self.endpoints.pubsub),
            IamTarget::Secret(_) => format!("{}/v1", self.endpoints.secretmanager),
        };
        format!("{base}/{}", target.resource())
    }

    pub(super) async fn iam_get_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>> {
        let url = format!(
            "{}/v1/projects/{project_id}/serviceAccounts/{email}",
            self.endpoints.iam
        );
        self.send_optional(IAM, self.request(Method::GET, &url))
            .instrument(tracing::debug_span!("gcp.service_account.get", account.email = email))
            .await
    }

    pub(super) async fn iam_create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        account: &ServiceAccount,
    ) -> Result<ServiceAccount> {
        let span = info_span!(
            "gcp.service_account.create",
            account.id = account_id,
            project.id = project_id
        );
        async move {
            info!("Creating service account {}", account_id);
            let url = format!(
                "{}/v1/projects/{project_id}/serviceAccounts",
                self.endpoints.iam
            );
            self.send(
                IAM,
                self.request(Method::POST, &url)
                    .json(&CreateServiceAccountRequest {
                        account_id,
                        service_account: account,
                    }),
            )
            .await
        }
        .instrument(span)
        .await
    }

    pub(super) async fn iam_get_policy(&self, target: &IamTarget) -> Result<Policy> {
        let url = format!("{}:getIamPolicy", self.policy_url(target));
        self.send(
            target.service(),
            self.request(Method::GET, &url)
                .query(&[("options.requestedPolicyVersion", "3")]),
        )
        .instrument(tracing::debug_span!("gcp.iam.get_policy", resource = %target))
        .await
    }

    pub(super) async fn iam_set_policy(&self, target: &IamTarget, policy: &Policy) -> Result<Policy> {
        let span = info_span!("gcp.iam.set_policy", resource = %target);
        async move {
            let url = format!("{}:setIamPolicy", self.policy_url(target));
            self.send(
                target.service(),
                self.request(Method::POST, &url)
                    .json(&json!({ "policy": policy })),
            )
            .await
        }
        .instrument(span)
        .await
    }
}
