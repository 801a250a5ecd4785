//! Resource name builders.
//!
//! All regional names share one [`Scope`], so project and region are
//! threaded explicitly instead of being read from the environment at each
//! call site.

use serde::Serialize;

/// Project and region a deployment targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub project_id: String,
    pub region: String,
}

impl Scope {
    #[must_use]
    pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: region.into(),
        }
    }

    /// `projects/{project}`
    #[must_use]
    pub fn project(&self) -> String {
        format!("projects/{}", self.project_id)
    }

    /// `projects/{project}/locations/{region}`
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}/locations/{}", self.project(), self.region)
    }

    #[must_use]
    pub fn function(&self, name: &str) -> String {
        format!("{}/functions/{name}", self.location())
    }

    /// Cloud Run service backing a 2nd gen function of the same name
    #[must_use]
    pub fn run_service(&self, name: &str) -> String {
        format!("{}/services/{name}", self.location())
    }

    #[must_use]
    pub fn job(&self, name: &str) -> String {
        format!("{}/jobs/{name}", self.location())
    }

    #[must_use]
    pub fn topic(&self, name: &str) -> String {
        format!("{}/topics/{name}", self.project())
    }

    #[must_use]
    pub fn subscription(&self, name: &str) -> String {
        format!("{}/subscriptions/{name}", self.project())
    }

    #[must_use]
    pub fn secret(&self, name: &str) -> String {
        format!("{}/secrets/{name}", self.project())
    }

    /// `{account_id}@{project}.iam.gserviceaccount.com`
    #[must_use]
    pub fn service_account_email(&self, account_id: &str) -> String {
        format!("{account_id}@{}.iam.gserviceaccount.com", self.project_id)
    }
}

/// IAM member string for a service account e-mail
#[must_use]
pub fn service_account_member(email: &str) -> String {
    format!("serviceAccount:{email}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_names() {
        let scope = Scope::new("doo-bots", "us-central1");
        assert_eq!(
            scope.function("dingers"),
            "projects/doo-bots/locations/us-central1/functions/dingers"
        );
        assert_eq!(
            scope.job("dingers-poll"),
            "projects/doo-bots/locations/us-central1/jobs/dingers-poll"
        );
        assert_eq!(
            scope.run_service("transactions"),
            "projects/doo-bots/locations/us-central1/services/transactions"
        );
    }

    #[test]
    fn test_global_names() {
        let scope = Scope::new("doo-bots", "us-central1");
        assert_eq!(
            scope.topic("transactions-pushes"),
            "projects/doo-bots/topics/transactions-pushes"
        );
        assert_eq!(
            scope.service_account_email("scheduler-invoker"),
            "scheduler-invoker@doo-bots.iam.gserviceaccount.com"
        );
        assert_eq!(
            service_account_member("a@b.iam.gserviceaccount.com"),
            "serviceAccount:a@b.iam.gserviceaccount.com"
        );
    }
}
