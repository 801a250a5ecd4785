//! # Ambient Credentials
//!
//! Resolves an OAuth2 access token and a default project id from the
//! invoking environment. Supported sources, in order:
//!
//! 1. `CLOUDSDK_AUTH_ACCESS_TOKEN` / `GOOGLE_OAUTH_ACCESS_TOKEN`
//! 2. The GCE / Cloud Build metadata server
//! 3. `gcloud auth print-access-token`
//!
//! The provisioner never reads the bots' secrets; it only needs a caller
//! identity allowed to manage the project.

use crate::constants::METADATA_TOKEN_URL;
use crate::error::{ProvisionError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// OAuth2 bearer token, wiped from memory on drop
#[derive(Clone)]
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// `Authorization` header value
    #[must_use]
    pub fn bearer(&self) -> String {
        if self.0.starts_with("Bearer ") {
            self.0.to_string()
        } else {
            format!("Bearer {}", self.0.as_str())
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// OAuth2 access token response from GCP metadata server
///
/// API Reference: https://cloud.google.com/compute/docs/metadata/querying-metadata
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code, reason = "Field is required for deserialization but not used after parsing")]
    expires_in: u64,
}

/// Resolve an access token from the ambient environment
///
/// # Errors
/// Returns [`ProvisionError::Auth`] when no source yields a token
pub async fn resolve_access_token() -> Result<AccessToken> {
    for key in ["CLOUDSDK_AUTH_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"] {
        if let Ok(token) = std::env::var(key) {
            if !token.trim().is_empty() {
                info!("Using access token from {}", key);
                return Ok(AccessToken::new(token.trim()));
            }
        }
    }

    if let Some(token) = metadata_token().await {
        info!("Retrieved access token from metadata server");
        return Ok(token);
    }

    if let Some(token) = gcloud(&["auth", "print-access-token"]).await {
        info!("Retrieved access token from gcloud");
        return Ok(AccessToken::new(token));
    }

    Err(ProvisionError::Auth(
        "no credentials found. Ensure:\n\
        1. CLOUDSDK_AUTH_ACCESS_TOKEN is set, OR\n\
        2. running on GCE / Cloud Build with a service account, OR\n\
        3. gcloud is installed and `gcloud auth login` has been run"
            .to_string(),
    ))
}

/// Resolve the default project id from the ambient environment
pub async fn ambient_project_id() -> Option<String> {
    for key in ["GOOGLE_CLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"] {
        if let Ok(project) = std::env::var(key) {
            if !project.trim().is_empty() {
                debug!("Using project from {}", key);
                return Some(project.trim().to_string());
            }
        }
    }
    gcloud(&["config", "get-value", "project"]).await
}

async fn metadata_token() -> Option<AccessToken> {
    let client = Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;

    match client
        .get(METADATA_TOKEN_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            match response.json::<TokenResponse>().await {
                Ok(token) => Some(AccessToken::new(token.access_token)),
                Err(e) => {
                    debug!("Failed to parse token response from metadata server: {}", e);
                    None
                }
            }
        }
        Ok(response) => {
            debug!("Metadata server returned status {}", response.status());
            None
        }
        Err(e) => {
            debug!("Metadata server not available: {}", e);
            None
        }
    }
}

/// Run gcloud and return trimmed stdout, if gcloud exists and succeeds
async fn gcloud(args: &[&str]) -> Option<String> {
    let binary = which::which("gcloud").ok()?;
    let output = tokio::process::Command::new(binary)
        .args(args)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        debug!(
            "gcloud {} exited with {}",
            args.join(" "),
            output.status
        );
        return None;
    }

    let stdout = String::from_utf8(output.stdout).ok()?;
    let value = stdout.trim();
    (!value.is_empty() && value != "(unset)").then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_prefix_added_once() {
        assert_eq!(AccessToken::new("ya29.abc").bearer(), "Bearer ya29.abc");
        assert_eq!(AccessToken::new("Bearer ya29.abc").bearer(), "Bearer ya29.abc");
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", AccessToken::new("ya29.secret"));
        assert!(!rendered.contains("secret"));
    }
}
