//! Cloud Scheduler v1 calls
//!
//! API Reference: https://cloud.google.com/scheduler/docs/reference/rest/v1/projects.locations.jobs
//!
//! Job mutations are synchronous; there is no long-running operation to wait on.

use super::client::GcpRestClient;
use crate::error::Result;
use crate::provider::model::SchedulerJob;
use reqwest::Method;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "cloudscheduler";

impl GcpRestClient {
    pub(super) async fn scheduler_get_job(&self, name: &str) -> Result<Option<SchedulerJob>> {
        let url = format!("{}/v1/{name}", self.endpoints.cloudscheduler);
        self.send_optional(SERVICE, self.request(Method::GET, &url))
            .instrument(tracing::debug_span!("gcp.scheduler.get", job.name = name))
            .await
    }

    pub(super) async fn scheduler_create_job(
        &self,
        parent: &str,
        job: &SchedulerJob,
    ) -> Result<SchedulerJob> {
        let span = info_span!("gcp.scheduler.create", job.name = %job.name);
        async move {
            info!("Creating scheduler job {}", job.name);
            let url = format!("{}/v1/{parent}/jobs", self.endpoints.cloudscheduler);
            self.send(SERVICE, self.request(Method::POST, &url).json(job))
                .await
        }
        .instrument(span)
        .await
    }

    pub(super) async fn scheduler_patch_job(
        &self,
        job: &SchedulerJob,
        update_mask: &[&str],
    ) -> Result<SchedulerJob> {
        let span = info_span!("gcp.scheduler.update", job.name = %job.name);
        async move {
            info!("Updating scheduler job {} ({})", job.name, update_mask.join(","));
            let url = format!("{}/v1/{}", self.endpoints.cloudscheduler, job.name);
            self.send(
                SERVICE,
                self.request(Method::PATCH, &url)
                    .query(&[("updateMask", update_mask.join(","))])
                    .json(job),
            )
            .await
        }
        .instrument(span)
        .await
    }
}
