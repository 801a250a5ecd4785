//! # GCP Control Plane
//!
//! [`ControlPlane`] over the public Google Cloud REST APIs.
//!
//! - `auth`: ambient credentials and project id
//! - `client`: HTTP plumbing, error mapping and operation polling
//! - `functions`, `iam`, `scheduler`, `pubsub`: one module per API
//!
//! Every base URL comes from [`Endpoints`](crate::config::Endpoints), so the
//! same client runs against Pact mock servers in tests.

use crate::error::Result;
use crate::provider::model::{
    CloudFunction, Policy, PushConfig, SchedulerJob, ServiceAccount, Subscription, Topic,
    UploadUrl,
};
use crate::provider::{ControlPlane, IamTarget};
use async_trait::async_trait;

pub mod auth;
mod client;
mod functions;
mod iam;
mod pubsub;
mod scheduler;

pub use auth::{ambient_project_id, resolve_access_token, AccessToken};
pub use client::GcpRestClient;

#[async_trait]
impl ControlPlane for GcpRestClient {
    async fn get_function(&self, name: &str) -> Result<Option<CloudFunction>> {
        self.functions_get(name).await
    }

    async fn generate_upload_url(&self, parent: &str) -> Result<UploadUrl> {
        self.functions_generate_upload_url(parent).await
    }

    async fn upload_source(&self, upload: &UploadUrl, archive: Vec<u8>) -> Result<()> {
        self.functions_upload_source(upload, archive).await
    }

    async fn create_function(
        &self,
        parent: &str,
        function_id: &str,
        function: &CloudFunction,
    ) -> Result<CloudFunction> {
        self.functions_create(parent, function_id, function).await
    }

    async fn update_function(
        &self,
        function: &CloudFunction,
        update_mask: &[&str],
    ) -> Result<CloudFunction> {
        self.functions_patch(function, update_mask).await
    }

    async fn get_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>> {
        self.iam_get_service_account(project_id, email).await
    }

    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        account: &ServiceAccount,
    ) -> Result<ServiceAccount> {
        self.iam_create_service_account(project_id, account_id, account)
            .await
    }

    async fn get_iam_policy(&self, target: &IamTarget) -> Result<Policy> {
        self.iam_get_policy(target).await
    }

    async fn set_iam_policy(&self, target: &IamTarget, policy: &Policy) -> Result<Policy> {
        self.iam_set_policy(target, policy).await
    }

    async fn get_job(&self, name: &str) -> Result<Option<SchedulerJob>> {
        self.scheduler_get_job(name).await
    }

    async fn create_job(&self, parent: &str, job: &SchedulerJob) -> Result<SchedulerJob> {
        self.scheduler_create_job(parent, job).await
    }

    async fn update_job(&self, job: &SchedulerJob, update_mask: &[&str]) -> Result<SchedulerJob> {
        self.scheduler_patch_job(job, update_mask).await
    }

    async fn get_topic(&self, name: &str) -> Result<Option<Topic>> {
        self.pubsub_get_topic(name).await
    }

    async fn create_topic(&self, topic: &Topic) -> Result<Topic> {
        self.pubsub_create_topic(topic).await
    }

    async fn get_subscription(&self, name: &str) -> Result<Option<Subscription>> {
        self.pubsub_get_subscription(name).await
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.pubsub_create_subscription(subscription).await
    }

    async fn modify_push_config(&self, subscription: &str, push_config: &PushConfig) -> Result<()> {
        self.pubsub_modify_push_config(subscription, push_config)
            .await
    }
}
