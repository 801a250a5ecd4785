//! # Deployment
//!
//! Converges the whole declared deployment in a fixed order:
//!
//! 1. Functions (their URLs and Cloud Run services feed later steps)
//! 2. Service identities
//! 3. Invoker grants for every identity on every function it invokes,
//!    on both the function and its backing Cloud Run service
//! 4. Secret accessor grants for function runtime identities
//! 5. Scheduler jobs, targeting the URLs from step 1
//! 6. Topics with their publisher grants, then push subscriptions
//!
//! The first failure aborts the run. Nothing already applied is rolled
//! back; re-running after fixing the cause converges the rest.

pub mod report;

pub use report::{RunReport, StepRecord};

use crate::config::{check_sources, validate, DeploymentConfig};
use crate::constants::{roles, KNOWN_AFTER_APPLY};
use crate::error::{ProvisionError, Result};
use crate::observability::metrics;
use crate::provider::paths::service_account_member;
use crate::provider::{ControlPlane, IamTarget, Scope};
use crate::reconciler::{
    ensure, FunctionEndpoint, FunctionResource, IamGrant, JobResource, Mode, Resource,
    ServiceAccountResource, SubscriptionResource, TopicResource,
};
use crate::source;
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Entry point for one provisioning run
pub struct Deployment<'a> {
    config: &'a DeploymentConfig,
    scope: &'a Scope,
    control_plane: &'a dyn ControlPlane,
    mode: Mode,
    report: RunReport,
    /// Identities already ensured ahead of the function that runs as them
    ensured_accounts: HashSet<String>,
}

impl<'a> Deployment<'a> {
    /// Validate `config` and converge it against `control_plane`
    ///
    /// `config.project_id` must already be resolved.
    ///
    /// # Errors
    /// Returns the first validation or provider error; provider errors name
    /// the failing step
    pub async fn run(
        config: &DeploymentConfig,
        control_plane: &dyn ControlPlane,
        mode: Mode,
    ) -> Result<RunReport> {
        let project_id = config
            .project_id
            .clone()
            .ok_or_else(|| ProvisionError::Config("no project id resolved".to_string()))?;
        validate(config)?;
        check_sources(config)?;

        let scope = Scope::new(project_id, config.region.clone());
        let span = info_span!(
            "deployment.run",
            project.id = %scope.project_id,
            region = %scope.region,
            mode = ?mode
        );

        metrics::increment_runs();
        let started = Instant::now();
        let mut deployment = Deployment {
            config,
            scope: &scope,
            control_plane,
            mode,
            report: RunReport::new(&scope, mode),
            ensured_accounts: HashSet::new(),
        };
        let result = deployment.execute().instrument(span).await;
        metrics::observe_run_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                info!(
                    changes = deployment.report.changes(),
                    steps = deployment.report.steps.len(),
                    "Deployment converged"
                );
                Ok(deployment.report)
            }
            Err(e) => {
                metrics::increment_run_errors();
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<()> {
        self.functions().await?;
        self.service_accounts().await?;
        self.invoker_grants().await?;
        self.secret_grants().await?;
        self.jobs().await?;
        self.pubsub().await
    }

    /// Ensure one resource and record the outcome
    async fn step<R>(&mut self, resource: &R) -> Result<Option<R::State>>
    where
        R: Resource + ?Sized,
    {
        let applied = ensure(resource, self.control_plane, self.mode).await?;
        self.report
            .record(resource.kind(), resource.id(), applied.action, applied.drift);
        Ok(applied.state)
    }

    fn endpoint(&self, function: &str) -> Result<&FunctionEndpoint> {
        self.report.functions.get(function).ok_or_else(|| {
            ProvisionError::Config(format!("function '{function}' was not deployed"))
        })
    }

    async fn functions(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;

        for spec in &config.functions {
            if let Some(account) = spec
                .runtime_service_account
                .as_deref()
                .and_then(|identity| config.service_account(identity))
            {
                self.step(&ServiceAccountResource::new(scope, account)).await?;
                self.ensured_accounts.insert(account.account_id.clone());
            }

            let source_dir = config.source_path(spec);
            let packaged = source::package(&source_dir)
                .map_err(|e| ProvisionError::step("function", spec.name.clone(), e))?;
            let resource = FunctionResource::new(scope, spec, &packaged);
            let function = self.step(&resource).await?;

            let endpoint = match function {
                Some(live) => match FunctionEndpoint::of(&live, scope, &spec.name) {
                    Some(endpoint) => endpoint,
                    None if self.mode == Mode::Plan => known_after_apply(scope, &spec.name),
                    None => {
                        return Err(ProvisionError::step(
                            "function",
                            spec.name.clone(),
                            ProvisionError::UnexpectedResponse {
                                service: "cloudfunctions",
                                message: format!("function {} reported no URL", live.name),
                            },
                        ))
                    }
                },
                None => known_after_apply(scope, &spec.name),
            };
            info!(function = %spec.name, url = %endpoint.url, "Function endpoint");
            self.report.functions.insert(spec.name.clone(), endpoint);
        }
        Ok(())
    }

    async fn service_accounts(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;
        for account in &config.service_accounts {
            if self.ensured_accounts.contains(&account.account_id) {
                continue;
            }
            self.step(&ServiceAccountResource::new(scope, account)).await?;
        }
        Ok(())
    }

    async fn invoker_grants(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;
        for account in &config.service_accounts {
            let member = service_account_member(&scope.service_account_email(&account.account_id));
            for function in config.functions.iter().filter(|f| account.invokes(&f.name)) {
                let service = self.endpoint(&function.name)?.service.clone();
                let grants = [
                    IamGrant::new(
                        IamTarget::Function(scope.function(&function.name)),
                        roles::FUNCTIONS_INVOKER,
                        member.clone(),
                    ),
                    IamGrant::new(IamTarget::RunService(service), roles::RUN_INVOKER, member.clone()),
                ];
                for grant in &grants {
                    self.step(grant).await?;
                }
            }
        }
        Ok(())
    }

    async fn secret_grants(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;
        for spec in &config.functions {
            let Some(identity) = &spec.runtime_service_account else {
                continue;
            };
            let email = if identity.contains('@') {
                identity.clone()
            } else {
                scope.service_account_email(identity)
            };
            let member = service_account_member(&email);
            let secrets: BTreeSet<&str> = spec.secrets.iter().map(|s| s.secret.as_str()).collect();
            for secret in secrets {
                let grant = IamGrant::new(
                    IamTarget::Secret(scope.secret(secret)),
                    roles::SECRET_ACCESSOR,
                    member.clone(),
                );
                self.step(&grant).await?;
            }
        }
        Ok(())
    }

    async fn jobs(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;
        for spec in &config.jobs {
            let url = self.endpoint(&spec.target)?.url.clone();
            let invoker = scope.service_account_email(&spec.invoker);
            self.step(&JobResource::new(scope, spec, url, invoker)).await?;
        }
        Ok(())
    }

    async fn pubsub(&mut self) -> Result<()> {
        let config = self.config;
        let scope = self.scope;
        for spec in &config.topics {
            let topic = TopicResource::new(scope, spec);
            self.step(&topic).await?;
            for publisher in &spec.publishers {
                let grant = IamGrant::new(
                    IamTarget::Topic(topic.name()),
                    roles::PUBSUB_PUBLISHER,
                    publisher.clone(),
                );
                self.step(&grant).await?;
            }
        }
        for spec in &config.subscriptions {
            let url = self.endpoint(&spec.target)?.url.clone();
            let invoker = scope.service_account_email(&spec.invoker);
            self.step(&SubscriptionResource::new(scope, spec, url, invoker))
                .await?;
        }
        Ok(())
    }
}

fn known_after_apply(scope: &Scope, name: &str) -> FunctionEndpoint {
    FunctionEndpoint {
        url: KNOWN_AFTER_APPLY.to_string(),
        service: scope.run_service(name),
    }
}
