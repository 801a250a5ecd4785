//! # Deployment Configuration
//!
//! The declared desired state: which functions, identities, jobs, topics and
//! subscriptions should exist. Loaded from YAML or taken from
//! [`DeploymentConfig::default`], which describes the two bots.

use crate::constants::{
    DEFAULT_ACK_DEADLINE_SECS, DEFAULT_ENTRY_POINT, DEFAULT_REGION, DEFAULT_RUNTIME,
    DEFAULT_TIME_ZONE, GMAIL_PUSH_PUBLISHER, PROJECT_ID_PLACEHOLDER,
};
use crate::error::{ProvisionError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level deployment file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// GCP project id. Falls back to the ambient gcloud configuration when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Region for functions and scheduler jobs
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccountSpec>,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
    #[serde(default)]
    pub topics: Vec<TopicSpec>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSpec>,
    /// Directory that `source_dir` entries are relative to
    #[serde(skip)]
    #[schemars(skip)]
    pub base_dir: PathBuf,
}

/// An HTTP-triggered 2nd gen Cloud Function
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub name: String,
    /// Source tree uploaded verbatim
    pub source_dir: PathBuf,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Kubernetes-style quantity, e.g. `256Mi`
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    /// Plain environment variables. `${PROJECT_ID}` expands to the project id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretBinding>,
    /// Runtime identity: a declared account id or a full e-mail.
    /// When set, it is granted access to every referenced secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_service_account: Option<String>,
}

/// Secret Manager secret exposed as an environment variable
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SecretBinding {
    pub env: String,
    pub secret: String,
    #[serde(default = "default_secret_version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServiceAccountSpec {
    /// 6-30 characters, becomes `<account_id>@<project>.iam.gserviceaccount.com`
    pub account_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Functions this identity may invoke. Unset means every function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invokes: Option<Vec<String>>,
}

impl ServiceAccountSpec {
    /// Whether this identity should be granted invoker on `function`
    #[must_use]
    pub fn invokes(&self, function: &str) -> bool {
        self.invokes
            .as_ref()
            .is_none_or(|names| names.iter().any(|name| name == function))
    }
}

/// Cloud Scheduler job firing an authenticated HTTP request at a function
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unix cron expression
    pub schedule: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Function name whose URL is the target
    pub target: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Account id of the identity used for the OIDC token
    pub invoker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TopicSpec {
    pub name: String,
    /// IAM members granted `roles/pubsub.publisher` on the topic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publishers: Vec<String>,
}

/// Push subscription delivering each message to a function
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionSpec {
    pub name: String,
    pub topic: String,
    /// Function name whose URL is the push endpoint
    pub target: String,
    /// Account id of the identity used for the push OIDC token
    pub invoker: String,
    /// Only sent when the subscription is created; later changes are
    /// reported but not applied
    #[serde(default = "default_ack_deadline_secs")]
    pub ack_deadline_secs: u32,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_string()
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

fn default_memory() -> String {
    "256Mi".to_string()
}

fn default_timeout_secs() -> u32 {
    60
}

fn default_secret_version() -> String {
    "latest".to_string()
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_ack_deadline_secs() -> u32 {
    DEFAULT_ACK_DEADLINE_SECS
}

fn secret(env: &str, secret: &str) -> SecretBinding {
    SecretBinding {
        env: env.to_string(),
        secret: secret.to_string(),
        version: default_secret_version(),
    }
}

impl Default for DeploymentConfig {
    /// The dingers poller and the transactions forwarder
    fn default() -> Self {
        Self {
            project_id: None,
            region: default_region(),
            functions: vec![
                FunctionSpec {
                    name: "dingers".to_string(),
                    source_dir: PathBuf::from("dingers"),
                    runtime: default_runtime(),
                    entry_point: default_entry_point(),
                    memory: "256Mi".to_string(),
                    timeout_secs: 60,
                    max_instances: None,
                    env: BTreeMap::from([
                        ("FIRESTORE_DATABASE".to_string(), "dingers".to_string()),
                        ("FIRESTORE_COLLECTION".to_string(), "videos".to_string()),
                    ]),
                    secrets: vec![secret(
                        "DISCORD_DINGERS_WEBHOOK_URL",
                        "discord-dingers-webhook-url",
                    )],
                    runtime_service_account: None,
                },
                FunctionSpec {
                    name: "transactions".to_string(),
                    source_dir: PathBuf::from("transactions"),
                    runtime: default_runtime(),
                    entry_point: default_entry_point(),
                    memory: "512Mi".to_string(),
                    timeout_secs: 120,
                    max_instances: None,
                    env: BTreeMap::from([(
                        "GCP_PROJECT_ID".to_string(),
                        PROJECT_ID_PLACEHOLDER.to_string(),
                    )]),
                    secrets: vec![
                        secret("GMAIL_CREDENTIALS_JSON", "gmail-credentials"),
                        secret(
                            "DISCORD_TRANSACTIONS_WEBHOOK_URL",
                            "discord-transactions-webhook-url",
                        ),
                        secret(
                            "DISCORD_TRADE_BLOCK_WEBHOOK_URL",
                            "discord-trade-block-webhook-url",
                        ),
                    ],
                    runtime_service_account: None,
                },
            ],
            service_accounts: vec![
                ServiceAccountSpec {
                    account_id: "scheduler-invoker".to_string(),
                    display_name: "Cloud Scheduler invoker".to_string(),
                    description: Some("Fires the dingers poll and the watch renewal".to_string()),
                    invokes: None,
                },
                ServiceAccountSpec {
                    account_id: "pubsub-invoker".to_string(),
                    display_name: "Pub/Sub push invoker".to_string(),
                    description: Some("Delivers Gmail notifications to transactions".to_string()),
                    invokes: None,
                },
            ],
            jobs: vec![
                JobSpec {
                    name: "dingers-poll".to_string(),
                    description: Some("Check for new home run highlights".to_string()),
                    schedule: "*/5 * * * *".to_string(),
                    time_zone: default_time_zone(),
                    target: "dingers".to_string(),
                    method: "GET".to_string(),
                    headers: BTreeMap::new(),
                    body: None,
                    invoker: "scheduler-invoker".to_string(),
                },
                JobSpec {
                    name: "transactions-renew-watch".to_string(),
                    description: Some("Renew the Gmail push watch before it expires".to_string()),
                    schedule: "0 9 * * *".to_string(),
                    time_zone: default_time_zone(),
                    target: "transactions".to_string(),
                    method: "POST".to_string(),
                    headers: BTreeMap::from([(
                        "Content-Type".to_string(),
                        "application/json".to_string(),
                    )]),
                    body: Some(r#"{"action":"renew_watch"}"#.to_string()),
                    invoker: "scheduler-invoker".to_string(),
                },
            ],
            topics: vec![TopicSpec {
                name: "transactions-pushes".to_string(),
                publishers: vec![GMAIL_PUSH_PUBLISHER.to_string()],
            }],
            subscriptions: vec![SubscriptionSpec {
                name: "transactions-pushes-sub".to_string(),
                topic: "transactions-pushes".to_string(),
                target: "transactions".to_string(),
                invoker: "pubsub-invoker".to_string(),
                ack_deadline_secs: default_ack_deadline_secs(),
            }],
            base_dir: PathBuf::from("."),
        }
    }
}

impl DeploymentConfig {
    /// Parse a YAML deployment file. Source directories resolve against the
    /// file's parent directory.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ProvisionError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        config.base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    /// Parse YAML text
    ///
    /// # Errors
    /// Returns an error when the text is not a valid deployment document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| ProvisionError::Config(format!("failed to parse deployment file: {e}")))
    }

    /// Render back to YAML
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ProvisionError::Config(format!("failed to render deployment file: {e}")))
    }

    /// Absolute-or-relative path of a function's source tree
    #[must_use]
    pub fn source_path(&self, function: &FunctionSpec) -> PathBuf {
        self.base_dir.join(&function.source_dir)
    }

    #[must_use]
    pub fn service_account(&self, account_id: &str) -> Option<&ServiceAccountSpec> {
        self.service_accounts
            .iter()
            .find(|account| account.account_id == account_id)
    }

    /// JSON schema of the deployment file
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(DeploymentConfig)
    }
}

/// Expand `${PROJECT_ID}` in an environment value
#[must_use]
pub fn expand_project(value: &str, project_id: &str) -> String {
    value.replace(PROJECT_ID_PLACEHOLDER, project_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_describes_both_bots() {
        let config = DeploymentConfig::default();
        assert_eq!(config.functions.len(), 2);
        assert_eq!(config.service_accounts.len(), 2);
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.topics.len(), 1);
        assert_eq!(config.subscriptions.len(), 1);

        let renew = &config.jobs[1];
        assert_eq!(renew.method, "POST");
        assert_eq!(renew.body.as_deref(), Some(r#"{"action":"renew_watch"}"#));
        assert_eq!(
            renew.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(config.jobs[0].schedule, "*/5 * * * *");
    }

    #[test]
    fn test_default_functions_leave_scaling_to_the_platform() {
        let config = DeploymentConfig::default();
        assert!(config.functions.iter().all(|f| f.max_instances.is_none()));
        assert!(!config.to_yaml().unwrap().contains("max_instances"));
    }

    #[test]
    fn test_yaml_defaults_are_applied() {
        let config = DeploymentConfig::from_yaml(
            r"
project_id: doo-bots
functions:
  - name: dingers
    source_dir: bots/dingers
jobs:
  - name: dingers-poll
    schedule: '*/5 * * * *'
    target: dingers
    invoker: scheduler-invoker
",
        )
        .unwrap();

        assert_eq!(config.region, "us-central1");
        let function = &config.functions[0];
        assert_eq!(function.runtime, "python312");
        assert_eq!(function.entry_point, "main");
        assert_eq!(function.memory, "256Mi");
        assert_eq!(config.jobs[0].method, "GET");
        assert_eq!(config.jobs[0].time_zone, "Etc/UTC");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = DeploymentConfig::from_yaml("regoin: europe-west1\n").unwrap_err();
        assert!(err.to_string().contains("regoin"));
    }

    #[test]
    fn test_yaml_round_trip_preserves_default() {
        let config = DeploymentConfig::default();
        let rendered = config.to_yaml().unwrap();
        let mut parsed = DeploymentConfig::from_yaml(&rendered).unwrap();
        parsed.base_dir = config.base_dir.clone();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_expand_project_placeholder() {
        assert_eq!(expand_project("${PROJECT_ID}", "doo-bots"), "doo-bots");
        assert_eq!(expand_project("plain", "doo-bots"), "plain");
    }

    #[test]
    fn test_invokes_defaults_to_every_function() {
        let mut account = DeploymentConfig::default().service_accounts[0].clone();
        assert!(account.invokes("dingers"));
        account.invokes = Some(vec!["transactions".to_string()]);
        assert!(!account.invokes("dingers"));
        assert!(account.invokes("transactions"));
    }

    #[test]
    fn test_load_resolves_sources_against_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.yaml");
        std::fs::write(&path, "functions:\n  - name: dingers\n    source_dir: dingers\n").unwrap();

        let config = DeploymentConfig::load(&path).unwrap();
        assert_eq!(
            config.source_path(&config.functions[0]),
            dir.path().join("dingers")
        );
    }
}
