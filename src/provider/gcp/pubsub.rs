//! Pub/Sub v1 calls
//!
//! References:
//! - [Topics](https://cloud.google.com/pubsub/docs/reference/rest/v1/projects.topics)
//! - [Subscriptions](https://cloud.google.com/pubsub/docs/reference/rest/v1/projects.subscriptions)
//!
//! Topics and subscriptions are created with `PUT` on their full name.

use super::client::GcpRestClient;
use crate::error::Result;
use crate::provider::model::{PushConfig, Subscription, Topic};
use reqwest::Method;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "pubsub";

impl GcpRestClient {
    fn pubsub_url(&self, name: &str) -> String {
        format!("{}/v1/{name}", self.endpoints.pubsub)
    }

    pub(super) async fn pubsub_get_topic(&self, name: &str) -> Result<Option<Topic>> {
        self.send_optional(SERVICE, self.request(Method::GET, &self.pubsub_url(name)))
            .instrument(tracing::debug_span!("gcp.pubsub.topic.get", topic.name = name))
            .await
    }

    pub(super) async fn pubsub_create_topic(&self, topic: &Topic) -> Result<Topic> {
        let span = info_span!("gcp.pubsub.topic.create", topic.name = %topic.name);
        async move {
            info!("Creating topic {}", topic.name);
            self.send(
                SERVICE,
                self.request(Method::PUT, &self.pubsub_url(&topic.name))
                    .json(&json!({ "labels": topic.labels })),
            )
            .await
        }
        .instrument(span)
        .await
    }

    pub(super) async fn pubsub_get_subscription(&self, name: &str) -> Result<Option<Subscription>> {
        self.send_optional(SERVICE, self.request(Method::GET, &self.pubsub_url(name)))
            .instrument(tracing::debug_span!(
                "gcp.pubsub.subscription.get",
                subscription.name = name
            ))
            .await
    }

    pub(super) async fn pubsub_create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription> {
        let span = info_span!(
            "gcp.pubsub.subscription.create",
            subscription.name = %subscription.name
        );
        async move {
            info!("Creating subscription {}", subscription.name);
            self.send(
                SERVICE,
                self.request(Method::PUT, &self.pubsub_url(&subscription.name))
                    .json(subscription),
            )
            .await
        }
        .instrument(span)
        .await
    }

    pub(super) async fn pubsub_modify_push_config(
        &self,
        subscription: &str,
        push_config: &PushConfig,
    ) -> Result<()> {
        let span = info_span!("gcp.pubsub.subscription.modify_push_config", subscription.name = subscription);
        async move {
            info!("Updating push config of {}", subscription);
            let url = format!("{}:modifyPushConfig", self.pubsub_url(subscription));
            // Answers with an empty object
            let _: IgnoredAny = self
                .send(
                    SERVICE,
                    self.request(Method::POST, &url)
                        .json(&json!({ "pushConfig": push_config })),
                )
                .await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}
