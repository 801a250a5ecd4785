//! # Errors
//!
//! Error type shared by the control plane client, the packager and the
//! reconciler. Every variant is terminal for a run: the deployment aborts
//! on the first error and the operator re-runs after fixing the cause.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The provider answered with a non-success status
    #[error("{service} API error: {message} (code: {code}, status: {status})")]
    Api {
        service: &'static str,
        code: u16,
        status: String,
        message: String,
    },

    /// The request never produced a response
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to obtain an access token: {0}")]
    Auth(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read source tree {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to package source tree {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A long-running operation finished with an error status
    #[error("operation {name} failed: {message} (code: {code})")]
    OperationFailed {
        name: String,
        code: i32,
        message: String,
    },

    #[error("operation {name} did not complete within {waited_secs}s")]
    OperationTimeout { name: String, waited_secs: u64 },

    /// The provider returned a body we could not interpret
    #[error("unexpected {service} response: {message}")]
    UnexpectedResponse {
        service: &'static str,
        message: String,
    },

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Wraps the failure of one reconcile step with the resource it targeted
    #[error("{kind} {id}: {source}")]
    StepFailed {
        kind: &'static str,
        id: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// True for an API 404 (possibly wrapped in a step failure)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { code, .. } => *code == 404,
            Self::StepFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True for an API 409 (resource already exists / concurrent modification)
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Api { code, .. } => *code == 409,
            Self::StepFailed { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    pub(crate) fn step(kind: &'static str, id: impl Into<String>, source: Self) -> Self {
        Self::StepFailed {
            kind,
            id: id.into(),
            source: Box::new(source),
        }
    }
}
