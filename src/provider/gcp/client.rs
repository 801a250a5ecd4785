//! GCP REST Client
//!
//! Native REST implementation over the public Google Cloud APIs.
//! Uses reqwest for HTTP requests and a bearer token for authentication.
//!
//! This implementation:
//! - Works directly with Pact HTTP mock servers (see [`Endpoints`])
//! - Maps every non-success response to [`ProvisionError::Api`]
//! - Treats 404 on a read as "resource absent"
//! - Blocks on long-running operations until they complete

use super::auth::{resolve_access_token, AccessToken};
use crate::config::{Endpoints, ProvisionerConfig};
use crate::error::{ProvisionError, Result};
use crate::observability::metrics;
use crate::provider::model::Operation;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// GCP control plane REST client
pub struct GcpRestClient {
    pub(super) http_client: Client,
    pub(super) endpoints: Endpoints,
    access_token: AccessToken,
    poll_interval: Duration,
    operation_timeout: Duration,
}

impl std::fmt::Debug for GcpRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpRestClient")
            .field("endpoints", &self.endpoints)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Response Structures
// ============================================================================

/// GCP API error response wrapper
///
/// API Reference: https://cloud.google.com/apis/design/errors
#[derive(Debug, Deserialize)]
struct GcpErrorResponse {
    error: GcpError,
}

#[derive(Debug, Deserialize)]
struct GcpError {
    /// HTTP status code (e.g., 404, 403, 500)
    code: u16,
    /// Human-readable error message
    message: String,
    /// Error status string (e.g., "NOT_FOUND", "PERMISSION_DENIED")
    #[serde(default)]
    status: String,
}

impl GcpRestClient {
    /// Create a client using ambient credentials
    ///
    /// # Errors
    /// Returns an error if client initialization or token retrieval fails
    pub async fn connect(config: &ProvisionerConfig) -> Result<Self> {
        let access_token = resolve_access_token().await?;
        Self::with_token(config, access_token)
    }

    /// Create a client with an explicit token
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn with_token(config: &ProvisionerConfig, access_token: AccessToken) -> Result<Self> {
        // Create HTTP client with rustls (already configured in Cargo.toml)
        let http_client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("bots-provisioner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ProvisionError::Transport {
                service: "http",
                source,
            })?;

        Ok(Self {
            http_client,
            endpoints: config.endpoints.clone(),
            access_token,
            poll_interval: config.operation_poll_interval(),
            operation_timeout: config.operation_timeout(),
        })
    }

    /// Build HTTP request with authentication headers
    pub(super) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", self.access_token.bearer())
            .header("Content-Type", "application/json")
    }

    /// Send a request and decode a JSON body
    pub(super) async fn send<T: DeserializeOwned>(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.execute(service, request).await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(service, response).await);
        }
        Self::decode(service, response).await
    }

    /// Send a read request; 404 means the resource does not exist
    pub(super) async fn send_optional<T: DeserializeOwned>(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let response = self.execute(service, request).await?;
        match response.status() {
            status if status.is_success() => Self::decode(service, response).await.map(Some),
            StatusCode::NOT_FOUND => {
                debug!(service, "Resource not found");
                Ok(None)
            }
            _ => Err(Self::error_from_response(service, response).await),
        }
    }

    /// Poll a long-running operation until it reports `done`
    ///
    /// `base` is the API root the operation name is relative to, e.g.
    /// `https://cloudfunctions.googleapis.com/v2`.
    pub(super) async fn wait_for_operation(
        &self,
        service: &'static str,
        base: &str,
        mut operation: Operation,
    ) -> Result<Operation> {
        let started = Instant::now();
        loop {
            if operation.done {
                if let Some(status) = operation.error {
                    return Err(ProvisionError::OperationFailed {
                        name: operation.name,
                        code: status.code,
                        message: status.message,
                    });
                }
                debug!(
                    operation = %operation.name,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Operation complete"
                );
                return Ok(operation);
            }

            if started.elapsed() >= self.operation_timeout {
                return Err(ProvisionError::OperationTimeout {
                    name: operation.name,
                    waited_secs: self.operation_timeout.as_secs(),
                });
            }

            debug!(operation = %operation.name, "Waiting for operation");
            tokio::time::sleep(self.poll_interval).await;
            let url = format!("{base}/{}", operation.name);
            operation = self.send(service, self.request(Method::GET, &url)).await?;
        }
    }

    async fn execute(&self, service: &'static str, request: RequestBuilder) -> Result<Response> {
        let start = Instant::now();
        let result = request.send().await;
        metrics::record_api_call(service, start.elapsed().as_secs_f64());
        result.map_err(|source| {
            metrics::increment_api_errors(service);
            ProvisionError::Transport { service, source }
        })
    }

    async fn decode<T: DeserializeOwned>(service: &'static str, response: Response) -> Result<T> {
        let text = response
            .text()
            .await
            .map_err(|source| ProvisionError::Transport { service, source })?;
        // Empty bodies (e.g. modifyPushConfig) decode as an empty object
        let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(body).map_err(|e| ProvisionError::UnexpectedResponse {
            service,
            message: e.to_string(),
        })
    }

    /// Handle GCP API error responses
    async fn error_from_response(service: &'static str, response: Response) -> ProvisionError {
        metrics::increment_api_errors(service);
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        let error = Self::parse_error(service, status, &error_text);
        warn!(service, code = status.as_u16(), "API call failed: {}", error);
        error
    }

    fn parse_error(service: &'static str, status: StatusCode, error_text: &str) -> ProvisionError {
        if let Ok(error_response) = serde_json::from_str::<GcpErrorResponse>(error_text) {
            ProvisionError::Api {
                service,
                code: error_response.error.code,
                status: error_response.error.status,
                message: error_response.error.message,
            }
        } else {
            ProvisionError::Api {
                service,
                code: status.as_u16(),
                status: status
                    .canonical_reason()
                    .unwrap_or("UNKNOWN")
                    .to_string(),
                message: error_text.to_string(),
            }
        }
    }
}
