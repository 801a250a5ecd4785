//! # Run Report
//!
//! What one run did, step by step, with per-kind totals. Rendered as an
//! aligned text table for terminals or as JSON for pipelines.

use crate::error::Result;
use crate::provider::Scope;
use crate::reconciler::{Action, FunctionEndpoint, Mode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One reconciled resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub kind: &'static str,
    pub id: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project_id: String,
    pub region: String,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    /// Function name to endpoint, as used by the jobs and subscriptions
    pub functions: BTreeMap<String, FunctionEndpoint>,
    pub steps: Vec<StepRecord>,
    pub counts: BTreeMap<&'static str, BTreeMap<Action, usize>>,
}

impl RunReport {
    #[must_use]
    pub fn new(scope: &Scope, mode: Mode) -> Self {
        Self {
            project_id: scope.project_id.clone(),
            region: scope.region.clone(),
            mode,
            started_at: Utc::now(),
            functions: BTreeMap::new(),
            steps: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, kind: &'static str, id: String, action: Action, drift: Vec<String>) {
        *self
            .counts
            .entry(kind)
            .or_default()
            .entry(action)
            .or_default() += 1;
        self.steps.push(StepRecord {
            kind,
            id,
            action,
            drift,
        });
    }

    /// Number of `kind` resources that ended with `action`
    #[must_use]
    pub fn count(&self, kind: &str, action: Action) -> usize {
        self.counts
            .get(kind)
            .and_then(|actions| actions.get(&action))
            .copied()
            .unwrap_or(0)
    }

    /// Steps that created or updated something (or would, in plan mode)
    #[must_use]
    pub fn changes(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.action.is_change())
            .count()
    }

    /// # Errors
    /// Returns an error if the report cannot be serialized
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_width = self
            .steps
            .iter()
            .map(|step| step.kind.len())
            .max()
            .unwrap_or(4)
            .max(4);
        let action_width = self
            .steps
            .iter()
            .map(|step| step.action.as_str().len())
            .max()
            .unwrap_or(6)
            .max(6);

        let verb = match self.mode {
            Mode::Apply => "Applied",
            Mode::Plan => "Plan for",
        };
        writeln!(f, "{verb} {} ({})", self.project_id, self.region)?;
        writeln!(f)?;
        writeln!(f, "{:<kind_width$}  {:<action_width$}  RESOURCE", "KIND", "ACTION")?;
        for step in &self.steps {
            write!(
                f,
                "{:<kind_width$}  {:<action_width$}  {}",
                step.kind,
                step.action.as_str(),
                step.id
            )?;
            if !step.drift.is_empty() {
                write!(f, " [{}]", step.drift.join(", "))?;
            }
            writeln!(f)?;
        }

        if !self.functions.is_empty() {
            writeln!(f)?;
            for (name, endpoint) in &self.functions {
                writeln!(f, "{name}: {}", endpoint.url)?;
            }
        }

        writeln!(f)?;
        for (kind, actions) in &self.counts {
            let summary: Vec<String> = actions
                .iter()
                .map(|(action, n)| format!("{n} {action}"))
                .collect();
            writeln!(f, "{kind}: {}", summary.join(", "))?;
        }
        writeln!(f, "{} change(s)", self.changes())
    }
}
