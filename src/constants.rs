//! # Constants
//!
//! Shared constants used throughout the provisioner.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default Cloud Functions v2 endpoint
pub const DEFAULT_CLOUDFUNCTIONS_ENDPOINT: &str = "https://cloudfunctions.googleapis.com";

/// Default Cloud Run v2 endpoint (backing services of 2nd gen functions)
pub const DEFAULT_RUN_ENDPOINT: &str = "https://run.googleapis.com";

/// Default IAM endpoint (service accounts)
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.googleapis.com";

/// Default Cloud Scheduler endpoint
pub const DEFAULT_CLOUDSCHEDULER_ENDPOINT: &str = "https://cloudscheduler.googleapis.com";

/// Default Pub/Sub endpoint
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Default Secret Manager endpoint (secret-level IAM only)
pub const DEFAULT_SECRETMANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com";

/// GCE / Cloud Build metadata server token endpoint
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Default long-running operation poll interval (milliseconds)
pub const DEFAULT_OPERATION_POLL_INTERVAL_MS: u64 = 2000;

/// Default ceiling on waiting for a single long-running operation (seconds)
/// Function builds routinely take several minutes
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 900;

/// Default per-request HTTP timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default region for every regional resource
pub const DEFAULT_REGION: &str = "us-central1";

/// Default Cloud Scheduler time zone
pub const DEFAULT_TIME_ZONE: &str = "Etc/UTC";

/// Default Pub/Sub acknowledgement deadline (seconds)
pub const DEFAULT_ACK_DEADLINE_SECS: u32 = 60;

/// Default function runtime
pub const DEFAULT_RUNTIME: &str = "python312";

/// Default function entry point
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// Label carrying the SHA-256 of the packaged source tree
pub const SOURCE_DIGEST_LABEL: &str = "source-digest";

/// Label marking resources owned by this tool
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "bots-provisioner";

/// Placeholder for values only known once an upstream resource is created
pub const KNOWN_AFTER_APPLY: &str = "(known after apply)";

/// Token expanded to the project id inside environment variable values
pub const PROJECT_ID_PLACEHOLDER: &str = "${PROJECT_ID}";

/// Roles granted by the provisioner
pub mod roles {
    /// Invoke a 2nd gen Cloud Function
    pub const FUNCTIONS_INVOKER: &str = "roles/cloudfunctions.invoker";
    /// Invoke the Cloud Run service backing a 2nd gen function
    pub const RUN_INVOKER: &str = "roles/run.invoker";
    /// Publish to a Pub/Sub topic
    pub const PUBSUB_PUBLISHER: &str = "roles/pubsub.publisher";
    /// Read a Secret Manager secret payload
    pub const SECRET_ACCESSOR: &str = "roles/secretmanager.secretAccessor";
}

/// Identity Gmail uses when publishing watch notifications
pub const GMAIL_PUSH_PUBLISHER: &str = "serviceAccount:gmail-api-push@system.gserviceaccount.com";
