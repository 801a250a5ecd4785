//! Common test utilities
//!
//! - rustls crypto provider setup for the Pact tests
//! - [`FakeControlPlane`], an in-memory project for the deployment tests
//! - [`bot_workspace`], a deployment rooted in a temporary directory

#![allow(dead_code, reason = "Each test crate uses a different subset of helpers")]

use async_trait::async_trait;
use bots_provisioner::config::DeploymentConfig;
use bots_provisioner::provider::{
    CloudFunction, ControlPlane, IamTarget, Policy, PushConfig, SchedulerJob, ServiceAccount,
    StorageSource, Subscription, Topic, UploadUrl,
};
use bots_provisioner::{ProvisionError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, Once};
use tempfile::TempDir;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // The Pact mock server may already have installed a process-wide
        // provider; any installed provider is sufficient for the client.
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            assert!(
                rustls::crypto::CryptoProvider::get_default().is_some(),
                "Failed to install rustls crypto provider"
            );
        }
    });
}

pub const PROJECT: &str = "doo-bots";

/// Default two-bot deployment with source trees in a temporary directory
pub fn bot_workspace() -> (TempDir, DeploymentConfig) {
    let dir = TempDir::new().unwrap();
    for bot in ["dingers", "transactions"] {
        let root = dir.path().join(bot);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("main.py"),
            format!("def main(request):\n    return '{bot}'\n"),
        )
        .unwrap();
        std::fs::write(root.join("requirements.txt"), "functions-framework==3.*\n").unwrap();
    }

    let mut config = DeploymentConfig::default();
    config.project_id = Some(PROJECT.to_string());
    config.base_dir = dir.path().to_path_buf();
    (dir, config)
}

fn api_error(code: u16, status: &str, message: impl Into<String>) -> ProvisionError {
    ProvisionError::Api {
        service: "fake",
        code,
        status: status.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Default)]
struct FakeState {
    functions: BTreeMap<String, CloudFunction>,
    accounts: BTreeMap<String, ServiceAccount>,
    policies: HashMap<IamTarget, Policy>,
    jobs: BTreeMap<String, SchedulerJob>,
    topics: BTreeMap<String, Topic>,
    subscriptions: BTreeMap<String, Subscription>,
    /// Pending upload objects that have received an archive
    uploaded: Vec<String>,
    upload_urls: usize,
    /// `"{operation} {resource}"` for every mutating call, in order
    mutations: Vec<String>,
    reads: usize,
    /// `(operation, resource substring)` that should fail
    failures: Vec<(String, String)>,
    url_suffix: String,
    etag_counter: u64,
}

impl FakeState {
    fn mutate(&mut self, operation: &str, resource: &str) -> Result<()> {
        if self
            .failures
            .iter()
            .any(|(op, needle)| op == operation && resource.contains(needle.as_str()))
        {
            return Err(api_error(
                403,
                "PERMISSION_DENIED",
                format!("injected failure for {operation} {resource}"),
            ));
        }
        self.mutations.push(format!("{operation} {resource}"));
        Ok(())
    }

    fn target_exists(&self, target: &IamTarget) -> bool {
        match target {
            IamTarget::Function(name) => self.functions.contains_key(name),
            IamTarget::RunService(name) => self
                .functions
                .values()
                .any(|f| f.backing_service() == Some(name.as_str())),
            IamTarget::Topic(name) => self.topics.contains_key(name),
            IamTarget::Secret(_) => true,
        }
    }

    fn next_etag(&mut self) -> String {
        self.etag_counter += 1;
        format!("etag-{}", self.etag_counter)
    }

    /// What the platform adds on top of the submitted function
    fn as_deployed(function: &CloudFunction) -> CloudFunction {
        let mut deployed = function.clone();
        let service = deployed.service_config.get_or_insert_with(Default::default);
        service
            .environment_variables
            .insert("LOG_EXECUTION_ID".to_string(), "true".to_string());
        for secret in &mut service.secret_environment_variables {
            secret.project_id = "123456789".to_string();
        }
        deployed.state = Some("ACTIVE".to_string());
        deployed
    }
}

/// In-memory project implementing [`ControlPlane`]
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().url_suffix = "a1b2c3".to_string();
        fake
    }

    /// Make `operation` fail for resources whose name contains `needle`
    pub fn fail_on(&self, operation: &str, needle: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((operation.to_string(), needle.to_string()));
    }

    /// Simulate the platform assigning a new URL to a function
    pub fn move_function_url(&self, function: &str, url: &str) {
        let mut state = self.state.lock().unwrap();
        let live = state
            .functions
            .values_mut()
            .find(|f| f.name.ends_with(&format!("/functions/{function}")))
            .expect("function is deployed");
        live.url = Some(url.to_string());
        if let Some(service) = live.service_config.as_mut() {
            service.uri = Some(url.to_string());
        }
    }

    /// Simulate a deploy that left the function in `state`
    pub fn set_function_state(&self, function: &str, state: &str) {
        let mut guard = self.state.lock().unwrap();
        let live = guard
            .functions
            .values_mut()
            .find(|f| f.name.ends_with(&format!("/functions/{function}")))
            .expect("function is deployed");
        live.state = Some(state.to_string());
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn mutations_of(&self, operation: &str) -> Vec<String> {
        self.mutations()
            .into_iter()
            .filter(|m| m.split(' ').next() == Some(operation))
            .collect()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploaded.len()
    }

    pub fn function(&self, name: &str) -> Option<CloudFunction> {
        self.state.lock().unwrap().functions.get(name).cloned()
    }

    pub fn job(&self, name: &str) -> Option<SchedulerJob> {
        self.state.lock().unwrap().jobs.get(name).cloned()
    }

    pub fn subscription(&self, name: &str) -> Option<Subscription> {
        self.state.lock().unwrap().subscriptions.get(name).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }

    pub fn topic_count(&self) -> usize {
        self.state.lock().unwrap().topics.len()
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn function_count(&self) -> usize {
        self.state.lock().unwrap().functions.len()
    }

    pub fn policy(&self, target: &IamTarget) -> Policy {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_policies(&self) -> Vec<(IamTarget, Policy)> {
        self.state
            .lock()
            .unwrap()
            .policies
            .iter()
            .map(|(target, policy)| (target.clone(), policy.clone()))
            .collect()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_function(&self, name: &str) -> Result<Option<CloudFunction>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.functions.get(name).cloned())
    }

    async fn generate_upload_url(&self, parent: &str) -> Result<UploadUrl> {
        let mut state = self.state.lock().unwrap();
        state.mutate("generate_upload_url", parent)?;
        state.upload_urls += 1;
        let object = format!("uploads/{}.zip", state.upload_urls);
        Ok(UploadUrl {
            upload_url: format!("https://storage.fake/{object}"),
            storage_source: StorageSource {
                bucket: format!("gcf-v2-uploads-{PROJECT}"),
                object,
                generation: None,
            },
        })
    }

    async fn upload_source(&self, upload: &UploadUrl, archive: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutate("upload_source", &upload.upload_url)?;
        assert!(!archive.is_empty(), "uploaded an empty archive");
        state.uploaded.push(upload.storage_source.object.clone());
        Ok(())
    }

    async fn create_function(
        &self,
        parent: &str,
        function_id: &str,
        function: &CloudFunction,
    ) -> Result<CloudFunction> {
        let mut state = self.state.lock().unwrap();
        let name = format!("{parent}/functions/{function_id}");
        state.mutate("create_function", &name)?;
        if state.functions.contains_key(&name) {
            return Err(api_error(409, "ALREADY_EXISTS", format!("{name} exists")));
        }
        let object = function
            .build_config
            .as_ref()
            .and_then(|b| b.source.as_ref())
            .and_then(|s| s.storage_source.as_ref())
            .map(|s| s.object.clone())
            .unwrap_or_default();
        assert!(
            state.uploaded.contains(&object),
            "function created from an archive that was never uploaded"
        );

        let mut deployed = FakeState::as_deployed(function);
        deployed.name.clone_from(&name);
        let url = format!("https://{function_id}-{}-uc.a.run.app", state.url_suffix);
        deployed.url = Some(url.clone());
        let service = deployed.service_config.get_or_insert_with(Default::default);
        service.uri = Some(url);
        service.service = Some(format!("{parent}/services/{function_id}"));
        state.functions.insert(name, deployed.clone());
        Ok(deployed)
    }

    async fn update_function(
        &self,
        function: &CloudFunction,
        update_mask: &[&str],
    ) -> Result<CloudFunction> {
        let mut state = self.state.lock().unwrap();
        state.mutate("update_function", &function.name)?;
        assert!(!update_mask.is_empty(), "update without a mask");
        let Some(live) = state.functions.get(&function.name).cloned() else {
            return Err(api_error(404, "NOT_FOUND", function.name.clone()));
        };

        let mut deployed = FakeState::as_deployed(function);
        deployed.url.clone_from(&live.url);
        let live_service = live.service_config.unwrap_or_default();
        let service = deployed.service_config.get_or_insert_with(Default::default);
        service.uri = live_service.uri;
        service.service = live_service.service;
        state.functions.insert(function.name.clone(), deployed.clone());
        Ok(deployed)
    }

    async fn get_service_account(
        &self,
        _project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.accounts.get(email).cloned())
    }

    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        account: &ServiceAccount,
    ) -> Result<ServiceAccount> {
        let mut state = self.state.lock().unwrap();
        state.mutate("create_service_account", account_id)?;
        let email = format!("{account_id}@{project_id}.iam.gserviceaccount.com");
        let created = ServiceAccount {
            name: format!("projects/{project_id}/serviceAccounts/{email}"),
            email: email.clone(),
            ..account.clone()
        };
        state.accounts.insert(email, created.clone());
        Ok(created)
    }

    async fn get_iam_policy(&self, target: &IamTarget) -> Result<Policy> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if !state.target_exists(target) {
            return Err(api_error(404, "NOT_FOUND", format!("{target} not found")));
        }
        if let Some(policy) = state.policies.get(target) {
            return Ok(policy.clone());
        }
        let etag = state.next_etag();
        let policy = Policy {
            version: Some(1),
            bindings: Vec::new(),
            etag: Some(etag),
        };
        state.policies.insert(target.clone(), policy.clone());
        Ok(policy)
    }

    async fn set_iam_policy(&self, target: &IamTarget, policy: &Policy) -> Result<Policy> {
        let mut state = self.state.lock().unwrap();
        state.mutate("set_iam_policy", target.resource())?;
        let current_etag = state.policies.get(target).and_then(|p| p.etag.clone());
        if policy.etag != current_etag {
            return Err(api_error(409, "ABORTED", "etag mismatch"));
        }
        let mut stored = policy.clone();
        stored.etag = Some(state.next_etag());
        state.policies.insert(target.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_job(&self, name: &str) -> Result<Option<SchedulerJob>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.jobs.get(name).cloned())
    }

    async fn create_job(&self, _parent: &str, job: &SchedulerJob) -> Result<SchedulerJob> {
        let mut state = self.state.lock().unwrap();
        state.mutate("create_job", &job.name)?;
        let mut stored = job.clone();
        stored.state = Some("ENABLED".to_string());
        if let Some(target) = stored.http_target.as_mut() {
            target
                .headers
                .insert("User-Agent".to_string(), "Google-Cloud-Scheduler".to_string());
        }
        state.jobs.insert(job.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_job(&self, job: &SchedulerJob, update_mask: &[&str]) -> Result<SchedulerJob> {
        let mut state = self.state.lock().unwrap();
        state.mutate("update_job", &job.name)?;
        let Some(mut stored) = state.jobs.get(&job.name).cloned() else {
            return Err(api_error(404, "NOT_FOUND", job.name.clone()));
        };
        for path in update_mask {
            match *path {
                "schedule" => stored.schedule.clone_from(&job.schedule),
                "timeZone" => stored.time_zone.clone_from(&job.time_zone),
                "httpTarget" => {
                    stored.http_target.clone_from(&job.http_target);
                    if let Some(target) = stored.http_target.as_mut() {
                        target.headers.insert(
                            "User-Agent".to_string(),
                            "Google-Cloud-Scheduler".to_string(),
                        );
                    }
                }
                other => panic!("unexpected update mask path {other}"),
            }
        }
        state.jobs.insert(job.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_topic(&self, name: &str) -> Result<Option<Topic>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.topics.get(name).cloned())
    }

    async fn create_topic(&self, topic: &Topic) -> Result<Topic> {
        let mut state = self.state.lock().unwrap();
        state.mutate("create_topic", &topic.name)?;
        state.topics.insert(topic.name.clone(), topic.clone());
        Ok(topic.clone())
    }

    async fn get_subscription(&self, name: &str) -> Result<Option<Subscription>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        Ok(state.subscriptions.get(name).cloned())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        let mut state = self.state.lock().unwrap();
        state.mutate("create_subscription", &subscription.name)?;
        if !state.topics.contains_key(&subscription.topic) {
            return Err(api_error(404, "NOT_FOUND", "topic not found"));
        }
        state
            .subscriptions
            .insert(subscription.name.clone(), subscription.clone());
        Ok(subscription.clone())
    }

    async fn modify_push_config(&self, subscription: &str, push_config: &PushConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutate("modify_push_config", subscription)?;
        let Some(stored) = state.subscriptions.get_mut(subscription) else {
            return Err(api_error(404, "NOT_FOUND", subscription.to_string()));
        };
        stored.push_config = Some(push_config.clone());
        Ok(())
    }
}
