//! # Function Resource
//!
//! Deploys one HTTP-triggered 2nd gen function from a packaged source tree.
//!
//! The packaged tree's digest is stored in the `source-digest` label, so an
//! unchanged tree is never re-uploaded and a config-only change patches
//! just the service configuration.

use super::{note, Resource};
use crate::config::{expand_project, FunctionSpec};
use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, SOURCE_DIGEST_LABEL};
use crate::error::{ProvisionError, Result};
use crate::provider::{
    BuildConfig, CloudFunction, ControlPlane, FunctionSource, Scope, SecretEnvVar, ServiceConfig,
    StorageSource,
};
use crate::source::PackagedSource;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where a deployed function can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEndpoint {
    /// Stable HTTPS invocation URL
    pub url: String,
    /// Backing Cloud Run service, `projects/{p}/locations/{r}/services/{s}`
    pub service: String,
}

impl FunctionEndpoint {
    /// Endpoint of a live function; the service falls back to the
    /// same-named Cloud Run service when the provider omits it
    #[must_use]
    pub fn of(function: &CloudFunction, scope: &Scope, name: &str) -> Option<Self> {
        let url = function.invocation_url()?.to_string();
        let service = function
            .backing_service()
            .map_or_else(|| scope.run_service(name), ToString::to_string);
        Some(Self { url, service })
    }
}

#[derive(Debug)]
pub struct FunctionResource<'a> {
    scope: &'a Scope,
    spec: &'a FunctionSpec,
    source: &'a PackagedSource,
    /// Resolved e-mail of the runtime identity, if declared
    runtime_identity: Option<String>,
}

impl<'a> FunctionResource<'a> {
    #[must_use]
    pub fn new(scope: &'a Scope, spec: &'a FunctionSpec, source: &'a PackagedSource) -> Self {
        let runtime_identity = spec.runtime_service_account.as_ref().map(|identity| {
            if identity.contains('@') {
                identity.clone()
            } else {
                scope.service_account_email(identity)
            }
        });
        Self {
            scope,
            spec,
            source,
            runtime_identity,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.scope.function(&self.spec.name)
    }

    #[must_use]
    pub fn runtime_identity(&self) -> Option<&str> {
        self.runtime_identity.as_deref()
    }

    fn environment(&self) -> BTreeMap<String, String> {
        self.spec
            .env
            .iter()
            .map(|(key, value)| {
                (key.clone(), expand_project(value, &self.scope.project_id))
            })
            .collect()
    }

    fn secrets(&self) -> Vec<SecretEnvVar> {
        let mut secrets: Vec<SecretEnvVar> = self
            .spec
            .secrets
            .iter()
            .map(|binding| SecretEnvVar {
                key: binding.env.clone(),
                project_id: self.scope.project_id.clone(),
                secret: binding.secret.clone(),
                version: binding.version.clone(),
            })
            .collect();
        secrets.sort();
        secrets
    }

    /// Declared function body pointing at `source`
    fn desired(&self, source: Option<StorageSource>) -> CloudFunction {
        CloudFunction {
            name: self.name(),
            description: None,
            build_config: Some(BuildConfig {
                runtime: self.spec.runtime.clone(),
                entry_point: self.spec.entry_point.clone(),
                source: source.map(|storage_source| FunctionSource {
                    storage_source: Some(storage_source),
                }),
            }),
            service_config: Some(ServiceConfig {
                available_memory: Some(self.spec.memory.clone()),
                timeout_seconds: Some(self.spec.timeout_secs),
                max_instance_count: self.spec.max_instances,
                environment_variables: self.environment(),
                secret_environment_variables: self.secrets(),
                service_account_email: self.runtime_identity.clone(),
                // Reachable from Scheduler and Pub/Sub; callers still need
                // an invoker grant
                ingress_settings: Some("ALLOW_ALL".to_string()),
                uri: None,
                service: None,
            }),
            labels: BTreeMap::from([
                (SOURCE_DIGEST_LABEL.to_string(), self.label_digest()),
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            ]),
            environment: Some("GEN_2".to_string()),
            state: None,
            url: None,
        }
    }

    /// Label values are capped at 63 characters
    fn label_digest(&self) -> String {
        self.source.digest.chars().take(63).collect()
    }

    async fn upload(&self, control_plane: &dyn ControlPlane) -> Result<StorageSource> {
        let upload = control_plane
            .generate_upload_url(&self.scope.location())
            .await?;
        control_plane
            .upload_source(&upload, self.source.archive.clone())
            .await?;
        info!(
            function.name = %self.spec.name,
            files = self.source.file_count,
            "Uploaded source"
        );
        Ok(upload.storage_source)
    }
}

/// Update mask path for a drift field
fn mask_path(field: &str) -> &'static str {
    match field {
        "source" | "state" => "buildConfig.source",
        "runtime" => "buildConfig.runtime",
        "entry_point" => "buildConfig.entryPoint",
        "memory" => "serviceConfig.availableMemory",
        "timeout" => "serviceConfig.timeoutSeconds",
        "max_instances" => "serviceConfig.maxInstanceCount",
        "env" => "serviceConfig.environmentVariables",
        "secrets" => "serviceConfig.secretEnvironmentVariables",
        "service_account" => "serviceConfig.serviceAccountEmail",
        _ => "labels",
    }
}

#[async_trait]
impl Resource for FunctionResource<'_> {
    type State = CloudFunction;

    fn kind(&self) -> &'static str {
        "function"
    }

    fn id(&self) -> String {
        self.spec.name.clone()
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<CloudFunction>> {
        control_plane.get_function(&self.name()).await
    }

    fn drift(&self, live: &CloudFunction) -> Vec<String> {
        let mut drift = Vec::new();
        let build = live.build_config.clone().unwrap_or_default();
        let service = live.service_config.clone().unwrap_or_default();

        note(
            &mut drift,
            "source",
            live.labels.get(SOURCE_DIGEST_LABEL) != Some(&self.label_digest()),
        );
        // A failed deploy keeps the new digest label, so only ACTIVE counts as deployed
        note(
            &mut drift,
            "state",
            live.state.as_deref().is_some_and(|state| state != "ACTIVE"),
        );
        note(&mut drift, "runtime", build.runtime != self.spec.runtime);
        note(&mut drift, "entry_point", build.entry_point != self.spec.entry_point);
        note(
            &mut drift,
            "memory",
            service.available_memory.as_deref() != Some(self.spec.memory.as_str()),
        );
        note(
            &mut drift,
            "timeout",
            service.timeout_seconds != Some(self.spec.timeout_secs),
        );
        if let Some(max_instances) = self.spec.max_instances {
            note(
                &mut drift,
                "max_instances",
                service.max_instance_count != Some(max_instances),
            );
        }

        // The platform injects variables of its own
        let env_differs = self
            .environment()
            .iter()
            .any(|(key, value)| service.environment_variables.get(key) != Some(value));
        note(&mut drift, "env", env_differs);

        // The provider may echo the project number, so compare without it
        let strip = |secrets: &[SecretEnvVar]| {
            let mut keyed: Vec<(String, String, String)> = secrets
                .iter()
                .map(|s| (s.key.clone(), s.secret.clone(), s.version.clone()))
                .collect();
            keyed.sort();
            keyed
        };
        note(
            &mut drift,
            "secrets",
            strip(&service.secret_environment_variables) != strip(&self.secrets()),
        );

        if let Some(identity) = &self.runtime_identity {
            note(
                &mut drift,
                "service_account",
                service.service_account_email.as_ref() != Some(identity),
            );
        }
        drift
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<CloudFunction> {
        let storage_source = self.upload(control_plane).await?;
        let function = self.desired(Some(storage_source));
        control_plane
            .create_function(&self.scope.location(), &self.spec.name, &function)
            .await
    }

    async fn update(
        &self,
        control_plane: &dyn ControlPlane,
        live: CloudFunction,
        drift: &[String],
    ) -> Result<CloudFunction> {
        let storage_source = if drift.iter().any(|field| field == "source" || field == "state") {
            self.upload(control_plane).await?
        } else {
            debug!(function.name = %self.spec.name, "Source unchanged; reusing live archive");
            live.build_config
                .and_then(|build| build.source)
                .and_then(|source| source.storage_source)
                .ok_or_else(|| ProvisionError::UnexpectedResponse {
                    service: "cloudfunctions",
                    message: format!("function {} has no storage source", live.name),
                })?
        };

        let mut mask: Vec<&str> = drift.iter().map(|field| mask_path(field)).collect();
        mask.push("labels");
        mask.sort_unstable();
        mask.dedup();

        let function = self.desired(Some(storage_source));
        control_plane.update_function(&function, &mask).await
    }
}
