//! # Validation
//!
//! Structural validation of a [`DeploymentConfig`] before any API call is
//! made. All problems are collected so one run reports every mistake.

use super::deployment::DeploymentConfig;
use crate::error::{ProvisionError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{0,61}[a-z0-9]$").expect("valid function name regex")
});

static ACCOUNT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("valid account id regex")
});

static JOB_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,500}$").expect("valid job name regex"));

static PUBSUB_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9\-_.~+%]{2,254}$").expect("valid pubsub name regex")
});

static MEMORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*(Mi|Gi|M|G)$").expect("valid memory regex"));

static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env key regex"));

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Validate names, references and payloads.
///
/// # Errors
/// Returns [`ProvisionError::Config`] listing every problem found
pub fn validate(config: &DeploymentConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.region.trim().is_empty() {
        problems.push("region must not be empty".to_string());
    }

    let mut function_names = HashSet::new();
    for function in &config.functions {
        if !FUNCTION_NAME.is_match(&function.name) {
            problems.push(format!("function name '{}' is invalid", function.name));
        }
        if !function_names.insert(function.name.as_str()) {
            problems.push(format!("function '{}' is declared twice", function.name));
        }
        if !MEMORY.is_match(&function.memory) {
            problems.push(format!(
                "function '{}': memory '{}' is not a quantity like 256Mi",
                function.name, function.memory
            ));
        }
        if function.timeout_secs == 0 || function.timeout_secs > 3600 {
            problems.push(format!(
                "function '{}': timeout_secs must be between 1 and 3600",
                function.name
            ));
        }
        for key in function
            .env
            .keys()
            .chain(function.secrets.iter().map(|binding| &binding.env))
        {
            if !ENV_KEY.is_match(key) {
                problems.push(format!(
                    "function '{}': environment variable '{key}' is invalid",
                    function.name
                ));
            }
        }
        let mut env_keys = HashSet::new();
        for binding in &function.secrets {
            if function.env.contains_key(&binding.env) || !env_keys.insert(&binding.env) {
                problems.push(format!(
                    "function '{}': environment variable '{}' is bound twice",
                    function.name, binding.env
                ));
            }
        }
        if let Some(identity) = &function.runtime_service_account {
            if !identity.contains('@') && config.service_account(identity).is_none() {
                problems.push(format!(
                    "function '{}': runtime service account '{identity}' is not declared",
                    function.name
                ));
            }
        }
    }

    let mut account_ids = HashSet::new();
    for account in &config.service_accounts {
        if !ACCOUNT_ID.is_match(&account.account_id) {
            problems.push(format!(
                "service account id '{}' must be 6-30 lowercase letters, digits or hyphens",
                account.account_id
            ));
        }
        if !account_ids.insert(account.account_id.as_str()) {
            problems.push(format!(
                "service account '{}' is declared twice",
                account.account_id
            ));
        }
        for function in account.invokes.iter().flatten() {
            if !function_names.contains(function.as_str()) {
                problems.push(format!(
                    "service account '{}' invokes unknown function '{function}'",
                    account.account_id
                ));
            }
        }
    }

    let mut job_names = HashSet::new();
    for job in &config.jobs {
        if !JOB_NAME.is_match(&job.name) {
            problems.push(format!("job name '{}' is invalid", job.name));
        }
        if !job_names.insert(job.name.as_str()) {
            problems.push(format!("job '{}' is declared twice", job.name));
        }
        if job.schedule.split_whitespace().count() != 5 {
            problems.push(format!(
                "job '{}': schedule '{}' must have five cron fields",
                job.name, job.schedule
            ));
        }
        if !HTTP_METHODS.contains(&job.method.as_str()) {
            problems.push(format!(
                "job '{}': unsupported HTTP method '{}'",
                job.name, job.method
            ));
        }
        if !function_names.contains(job.target.as_str()) {
            problems.push(format!(
                "job '{}' targets unknown function '{}'",
                job.name, job.target
            ));
        }
        if !account_ids.contains(job.invoker.as_str()) {
            problems.push(format!(
                "job '{}' uses undeclared invoker '{}'",
                job.name, job.invoker
            ));
        }
        let declares_json = job.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case("content-type") && value.starts_with("application/json")
        });
        if let (true, Some(body)) = (declares_json, &job.body) {
            if let Err(e) = serde_json::from_str::<serde_json::Value>(body) {
                problems.push(format!("job '{}': body is not valid JSON: {e}", job.name));
            }
        }
        if job.body.is_some() && matches!(job.method.as_str(), "GET" | "HEAD" | "DELETE") {
            problems.push(format!(
                "job '{}': {} requests cannot carry a body",
                job.name, job.method
            ));
        }
    }

    let mut topic_names = HashSet::new();
    for topic in &config.topics {
        check_pubsub_name("topic", &topic.name, &mut problems);
        if !topic_names.insert(topic.name.as_str()) {
            problems.push(format!("topic '{}' is declared twice", topic.name));
        }
    }

    let mut subscription_names = HashSet::new();
    for subscription in &config.subscriptions {
        check_pubsub_name("subscription", &subscription.name, &mut problems);
        if !subscription_names.insert(subscription.name.as_str()) {
            problems.push(format!(
                "subscription '{}' is declared twice",
                subscription.name
            ));
        }
        if !topic_names.contains(subscription.topic.as_str()) {
            problems.push(format!(
                "subscription '{}' references unknown topic '{}'",
                subscription.name, subscription.topic
            ));
        }
        if !function_names.contains(subscription.target.as_str()) {
            problems.push(format!(
                "subscription '{}' targets unknown function '{}'",
                subscription.name, subscription.target
            ));
        }
        if !account_ids.contains(subscription.invoker.as_str()) {
            problems.push(format!(
                "subscription '{}' uses undeclared invoker '{}'",
                subscription.name, subscription.invoker
            ));
        }
        if !(10..=600).contains(&subscription.ack_deadline_secs) {
            problems.push(format!(
                "subscription '{}': ack_deadline_secs must be between 10 and 600",
                subscription.name
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::Config(problems.join("; ")))
    }
}

/// Check that every function's source tree exists on disk.
///
/// # Errors
/// Returns [`ProvisionError::Config`] naming the missing directories
pub fn check_sources(config: &DeploymentConfig) -> Result<()> {
    let missing: Vec<String> = config
        .functions
        .iter()
        .map(|function| config.source_path(function))
        .filter(|path| !path.is_dir())
        .map(|path| path.display().to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::Config(format!(
            "source directories not found: {}",
            missing.join(", ")
        )))
    }
}

fn check_pubsub_name(kind: &str, name: &str, problems: &mut Vec<String>) {
    if !PUBSUB_NAME.is_match(name) || name.starts_with("goog") {
        problems.push(format!("{kind} name '{name}' is invalid"));
    }
}
