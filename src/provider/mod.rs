//! # Provider Modules
//!
//! The control plane boundary. Everything the provisioner knows about the
//! cloud goes through [`ControlPlane`]; the reconciler never builds URLs or
//! parses HTTP responses itself.
//!
//! - `model`: JSON resource payloads
//! - `paths`: resource name builders for a project/region scope
//! - `gcp`: REST implementation against the public Google Cloud APIs

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

pub mod gcp;
pub mod model;
pub mod paths;

pub use model::*;
pub use paths::Scope;

/// A resource whose IAM policy the provisioner edits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IamTarget {
    /// `projects/{p}/locations/{r}/functions/{f}`
    Function(String),
    /// `projects/{p}/locations/{r}/services/{s}`
    RunService(String),
    /// `projects/{p}/topics/{t}`
    Topic(String),
    /// `projects/{p}/secrets/{s}`
    Secret(String),
}

impl IamTarget {
    /// Full resource name
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Function(name)
            | Self::RunService(name)
            | Self::Topic(name)
            | Self::Secret(name) => name,
        }
    }

    /// The API service that owns the policy
    #[must_use]
    pub fn service(&self) -> &'static str {
        match self {
            Self::Function(_) => "cloudfunctions",
            Self::RunService(_) => "run",
            Self::Topic(_) => "pubsub",
            Self::Secret(_) => "secretmanager",
        }
    }
}

impl fmt::Display for IamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource())
    }
}

/// Blocking-per-call view of the cloud control plane.
///
/// Getters return `Ok(None)` when the resource does not exist. Mutations
/// return only once the provider reports completion (long-running
/// operations are awaited by the implementation).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // Cloud Functions

    async fn get_function(&self, name: &str) -> Result<Option<CloudFunction>>;

    /// Reserve a signed upload location under `parent` (`projects/{p}/locations/{r}`)
    async fn generate_upload_url(&self, parent: &str) -> Result<UploadUrl>;

    /// Upload a zip archive to a location returned by [`generate_upload_url`](Self::generate_upload_url)
    async fn upload_source(&self, upload: &UploadUrl, archive: Vec<u8>) -> Result<()>;

    async fn create_function(
        &self,
        parent: &str,
        function_id: &str,
        function: &CloudFunction,
    ) -> Result<CloudFunction>;

    async fn update_function(
        &self,
        function: &CloudFunction,
        update_mask: &[&str],
    ) -> Result<CloudFunction>;

    // IAM

    async fn get_service_account(&self, project_id: &str, email: &str)
        -> Result<Option<ServiceAccount>>;

    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        account: &ServiceAccount,
    ) -> Result<ServiceAccount>;

    async fn get_iam_policy(&self, target: &IamTarget) -> Result<Policy>;

    async fn set_iam_policy(&self, target: &IamTarget, policy: &Policy) -> Result<Policy>;

    // Cloud Scheduler

    async fn get_job(&self, name: &str) -> Result<Option<SchedulerJob>>;

    async fn create_job(&self, parent: &str, job: &SchedulerJob) -> Result<SchedulerJob>;

    async fn update_job(&self, job: &SchedulerJob, update_mask: &[&str]) -> Result<SchedulerJob>;

    // Pub/Sub

    async fn get_topic(&self, name: &str) -> Result<Option<Topic>>;

    async fn create_topic(&self, topic: &Topic) -> Result<Topic>;

    async fn get_subscription(&self, name: &str) -> Result<Option<Subscription>>;

    async fn create_subscription(&self, subscription: &Subscription) -> Result<Subscription>;

    async fn modify_push_config(&self, subscription: &str, push_config: &PushConfig)
        -> Result<()>;
}
