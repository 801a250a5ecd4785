//! # Pub/Sub Resources
//!
//! - [`TopicResource`]: created if absent, never updated
//! - [`SubscriptionResource`]: push subscription whose endpoint follows the
//!   target function's URL. Only the push configuration is mutable; a
//!   subscription attached to a different topic is reported and left alone.

use super::{note, Resource};
use crate::config::{SubscriptionSpec, TopicSpec};
use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::error::Result;
use crate::provider::{ControlPlane, OidcToken, PushConfig, Scope, Subscription, Topic};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::warn;

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

#[derive(Debug)]
pub struct TopicResource<'a> {
    scope: &'a Scope,
    spec: &'a TopicSpec,
}

impl<'a> TopicResource<'a> {
    #[must_use]
    pub fn new(scope: &'a Scope, spec: &'a TopicSpec) -> Self {
        Self { scope, spec }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.scope.topic(&self.spec.name)
    }
}

#[async_trait]
impl Resource for TopicResource<'_> {
    type State = Topic;

    fn kind(&self) -> &'static str {
        "topic"
    }

    fn id(&self) -> String {
        self.spec.name.clone()
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<Topic>> {
        control_plane.get_topic(&self.name()).await
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<Topic> {
        control_plane
            .create_topic(&Topic {
                name: self.name(),
                labels: managed_labels(),
            })
            .await
    }
}

#[derive(Debug)]
pub struct SubscriptionResource<'a> {
    scope: &'a Scope,
    spec: &'a SubscriptionSpec,
    endpoint: String,
    invoker_email: String,
}

impl<'a> SubscriptionResource<'a> {
    #[must_use]
    pub fn new(
        scope: &'a Scope,
        spec: &'a SubscriptionSpec,
        endpoint: impl Into<String>,
        invoker_email: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            spec,
            endpoint: endpoint.into(),
            invoker_email: invoker_email.into(),
        }
    }

    fn push_config(&self) -> PushConfig {
        PushConfig {
            push_endpoint: self.endpoint.clone(),
            oidc_token: Some(OidcToken {
                service_account_email: self.invoker_email.clone(),
                audience: Some(self.endpoint.clone()),
            }),
        }
    }

    fn desired(&self) -> Subscription {
        Subscription {
            name: self.scope.subscription(&self.spec.name),
            topic: self.scope.topic(&self.spec.topic),
            push_config: Some(self.push_config()),
            ack_deadline_seconds: Some(self.spec.ack_deadline_secs),
            labels: managed_labels(),
        }
    }
}

#[async_trait]
impl Resource for SubscriptionResource<'_> {
    type State = Subscription;

    fn kind(&self) -> &'static str {
        "subscription"
    }

    fn id(&self) -> String {
        self.spec.name.clone()
    }

    async fn observe(&self, control_plane: &dyn ControlPlane) -> Result<Option<Subscription>> {
        control_plane
            .get_subscription(&self.scope.subscription(&self.spec.name))
            .await
    }

    fn drift(&self, live: &Subscription) -> Vec<String> {
        let declared_topic = self.scope.topic(&self.spec.topic);
        if live.topic != declared_topic {
            warn!(
                subscription = %self.spec.name,
                live.topic = %live.topic,
                declared.topic = %declared_topic,
                "Subscription topic is immutable; leaving it attached to its current topic"
            );
        }
        if let Some(live_deadline) = live
            .ack_deadline_seconds
            .filter(|deadline| *deadline != self.spec.ack_deadline_secs)
        {
            warn!(
                subscription = %self.spec.name,
                live.ack_deadline_secs = live_deadline,
                declared.ack_deadline_secs = self.spec.ack_deadline_secs,
                "Ack deadline only applies at creation; leaving the live value"
            );
        }

        let mut drift = Vec::new();
        let push = live.push_config.clone().unwrap_or_default();
        note(&mut drift, "push_endpoint", push.push_endpoint != self.endpoint);
        let oidc_matches = push.oidc_token.as_ref().is_some_and(|token| {
            token.service_account_email == self.invoker_email
                && token.audience.as_deref().unwrap_or(&push.push_endpoint) == self.endpoint
        });
        note(&mut drift, "oidc", !oidc_matches);
        drift
    }

    async fn create(&self, control_plane: &dyn ControlPlane) -> Result<Subscription> {
        control_plane.create_subscription(&self.desired()).await
    }

    async fn update(
        &self,
        control_plane: &dyn ControlPlane,
        mut live: Subscription,
        _drift: &[String],
    ) -> Result<Subscription> {
        let push_config = self.push_config();
        control_plane
            .modify_push_config(&live.name, &push_config)
            .await?;
        live.push_config = Some(push_config);
        Ok(live)
    }
}
