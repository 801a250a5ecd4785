//! Cloud Functions v2 calls
//!
//! References:
//! - [Cloud Functions REST API v2](https://cloud.google.com/functions/docs/reference/rest/v2/projects.locations.functions)

use super::client::GcpRestClient;
use crate::error::{ProvisionError, Result};
use crate::provider::model::{CloudFunction, Operation, UploadUrl};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, info_span, Instrument};

const SERVICE: &str = "cloudfunctions";

impl GcpRestClient {
    fn functions_base(&self) -> String {
        format!("{}/v2", self.endpoints.cloudfunctions)
    }

    pub(super) async fn functions_get(&self, name: &str) -> Result<Option<CloudFunction>> {
        let url = format!("{}/{name}", self.functions_base());
        self.send_optional(SERVICE, self.request(Method::GET, &url))
            .instrument(tracing::debug_span!("gcp.function.get", function.name = name))
            .await
    }

    pub(super) async fn functions_generate_upload_url(&self, parent: &str) -> Result<UploadUrl> {
        let url = format!("{}/{parent}/functions:generateUploadUrl", self.functions_base());
        self.send(
            SERVICE,
            self.request(Method::POST, &url)
                .json(&json!({ "environment": "GEN_2" })),
        )
        .await
    }

    /// Signed URL upload; the URL carries its own credentials
    pub(super) async fn functions_upload_source(
        &self,
        upload: &UploadUrl,
        archive: Vec<u8>,
    ) -> Result<()> {
        let size = archive.len();
        let response = self
            .http_client
            .put(&upload.upload_url)
            .header("Content-Type", "application/zip")
            .body(archive)
            .send()
            .await
            .map_err(|source| ProvisionError::Transport {
                service: "storage",
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Api {
                service: "storage",
                code: status.as_u16(),
                status: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
                message,
            });
        }

        debug!(
            bucket = %upload.storage_source.bucket,
            object = %upload.storage_source.object,
            bytes = size,
            "Uploaded function source"
        );
        Ok(())
    }

    pub(super) async fn functions_create(
        &self,
        parent: &str,
        function_id: &str,
        function: &CloudFunction,
    ) -> Result<CloudFunction> {
        let span = info_span!("gcp.function.create", function.id = function_id);
        async move {
            info!("Creating function {}", function_id);
            let url = format!("{}/{parent}/functions", self.functions_base());
            let operation: Operation = self
                .send(
                    SERVICE,
                    self.request(Method::POST, &url)
                        .query(&[("functionId", function_id)])
                        .json(function),
                )
                .await?;
            self.wait_for_operation(SERVICE, &self.functions_base(), operation)
                .await?;
            self.function_after_operation(&format!("{parent}/functions/{function_id}"))
                .await
        }
        .instrument(span)
        .await
    }

    pub(super) async fn functions_patch(
        &self,
        function: &CloudFunction,
        update_mask: &[&str],
    ) -> Result<CloudFunction> {
        let span = info_span!("gcp.function.update", function.name = %function.name);
        async move {
            info!("Updating function {} ({})", function.name, update_mask.join(","));
            let url = format!("{}/{}", self.functions_base(), function.name);
            let operation: Operation = self
                .send(
                    SERVICE,
                    self.request(Method::PATCH, &url)
                        .query(&[("updateMask", update_mask.join(","))])
                        .json(function),
                )
                .await?;
            self.wait_for_operation(SERVICE, &self.functions_base(), operation)
                .await?;
            self.function_after_operation(&function.name).await
        }
        .instrument(span)
        .await
    }

    /// Re-read the function once its operation completes so output fields
    /// (URL, backing service) are populated
    async fn function_after_operation(&self, name: &str) -> Result<CloudFunction> {
        self.functions_get(name)
            .await?
            .ok_or_else(|| ProvisionError::UnexpectedResponse {
                service: SERVICE,
                message: format!("function {name} missing after its operation completed"),
            })
    }
}
