//! # Scheduler Job Resource
//!
//! An HTTP job that calls a function with an OIDC token minted for the
//! invoker identity. The token audience is the function URL, which is
//! what the function's authentication layer checks.

use super::{note, Resource};
use crate::config::JobSpec;
use crate::error::Result;
use crate::provider::{ControlPlane, HttpTarget, OidcToken, SchedulerJob, Scope};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct JobResource<'a> {
    scope: &'a Scope,
    spec: &'a JobSpec,
    /// Current URL of the target function
    uri: String,
    invoker_email: String,
}

impl<'a> JobResource<'a> {
    #[must_use]
    pub fn new(
        scope: &'a Scope,
        spec: &'a JobSpec,
        uri: impl Into<String>,
        invoker_email: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            spec,
            uri: uri.into(),
            invoker_email: invoker_email.into(),
        }
    }

    fn desired(&self) -> SchedulerJob {
        SchedulerJob {
            name: self.scope.job(&self.spec.name),
            description: self.spec.description.clone(),
            schedule: self.spec.schedule.clone(),
            time_zone: self.spec.time_zone.clone(),
            http_target: Some(HttpTarget {
                uri: self.uri.clone(),
                http_method: self.spec.method.clone(),
                headers: self.spec.headers.clone(),
                body: self
                    .spec
                    .body
                    .as_ref()
                    .map(|body| general_purpose::STANDARD.encode(body)),
                oidc_token: Some(OidcToken {
                    service_account_email: self.invoker_email.clone(),
                    audience: Some(self.uri.clone()),
                }),
            }),
            state: None,
        }
    }
}

/// Headers the declared job needs are present with equal values.
/// Scheduler adds its own (`User-Agent`, a default `Content-Type`).
fn headers_match(desired: &BTreeMap<String, String>, live: &BTreeMap<String, String>) -> bool {
    desired.iter().all(|(name, value)| {
        live.iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(name) && v == value)
    })
}

fn decoded(body: Option<&str>) -> Option<Vec<u8>> {
    body.map(|b| general_purpose::STANDARD.decode(b).unwrap_or_else(|_| b.as_bytes().to_vec()))
}

#[async_trait]
impl Resource for JobResource<'_> {
    type State = SchedulerJob;

    fn kind(&self) -> &'static str {
        "scheduler_job"
    }

    fn id(&self) -> String {
        self.spec.name.clone()
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<SchedulerJob>> {
        control_plane.get_job(&self.scope.job(&self.spec.name)).await
    }

    fn drift(&self, live: &SchedulerJob) -> Vec<String> {
        let mut drift = Vec::new();
        note(&mut drift, "schedule", live.schedule != self.spec.schedule);
        note(&mut drift, "time_zone", live.time_zone != self.spec.time_zone);

        let Some(target) = &live.http_target else {
            drift.push("http_target".to_string());
            return drift;
        };
        note(&mut drift, "uri", target.uri != self.uri);
        note(
            &mut drift,
            "http_method",
            !target.http_method.eq_ignore_ascii_case(&self.spec.method),
        );
        note(
            &mut drift,
            "body",
            decoded(target.body.as_deref())
                != self.spec.body.as_ref().map(|b| b.as_bytes().to_vec()),
        );
        note(
            &mut drift,
            "headers",
            !headers_match(&self.spec.headers, &target.headers),
        );

        // An unset audience defaults to the target URI
        let oidc_matches = target.oidc_token.as_ref().is_some_and(|token| {
            token.service_account_email == self.invoker_email
                && token.audience.as_deref().unwrap_or(&target.uri) == self.uri
        });
        note(&mut drift, "oidc", !oidc_matches);
        drift
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<SchedulerJob> {
        control_plane
            .create_job(&self.scope.location(), &self.desired())
            .await
    }

    async fn update(
        &self,
        control_plane: &dyn ControlPlane,
        _live: SchedulerJob,
        drift: &[String],
    ) -> Result<SchedulerJob> {
        let mut mask: Vec<&str> = drift
            .iter()
            .map(|field| match field.as_str() {
                "schedule" => "schedule",
                "time_zone" => "timeZone",
                _ => "httpTarget",
            })
            .collect();
        mask.dedup();
        control_plane.update_job(&self.desired(), &mask).await
    }
}
