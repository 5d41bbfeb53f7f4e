//! Ordered step runner with fail-fast abort.
//!
//! A run is a `Vec<Step>` iterated in order. The first step that returns an
//! error ends the run: later steps are never invoked and earlier steps are not
//! undone. The returned error names the failing step.

use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

// ---------------------------------------------------------------------------
// StepKind / StepDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    GenerateSettings,
    DeployPackage,
    HealthCheck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Shell {
        command: String,
        #[serde(default = "default_timeout")]
        timeout_seconds: u32,
    },
}

fn default_timeout() -> u32 {
    600
}

/// A configured post-provision step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub name: String,
    pub step_type: StepKind,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, step_type: StepKind) -> Self {
        Self {
            name: name.into(),
            step_type,
        }
    }
}

/// The post-provision sequence used when config does not override it.
pub fn default_postprovision_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("generate-settings", StepKind::GenerateSettings),
        StepDefinition::new("deploy-package", StepKind::DeployPackage),
    ]
}

// ---------------------------------------------------------------------------
// Step / StepResult
// ---------------------------------------------------------------------------

/// A named invocation ready to run.
pub struct Step<'a> {
    name: String,
    action: Box<dyn FnMut() -> Result<()> + 'a>,
}

impl<'a> Step<'a> {
    pub fn new(name: impl Into<String>, action: impl FnMut() -> Result<()> + 'a) -> Self {
        Self {
            name: name.into(),
            action: Box::new(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    /// 1-indexed position in the run.
    pub index: usize,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// run_steps
// ---------------------------------------------------------------------------

/// Run `steps` in order, stopping at the first failure.
///
/// `on_start` fires before each step with its 1-indexed position and name,
/// so callers can print progress without the runner knowing about output.
pub fn run_steps(
    steps: Vec<Step<'_>>,
    mut on_start: impl FnMut(usize, &str),
) -> Result<Vec<StepResult>> {
    let mut results = Vec::with_capacity(steps.len());

    for (i, mut step) in steps.into_iter().enumerate() {
        let index = i + 1;
        on_start(index, &step.name);
        tracing::info!(step = %step.name, index, "starting step");

        let start = Instant::now();
        if let Err(e) = (step.action)() {
            tracing::warn!(step = %step.name, index, error = %e, "step failed, aborting run");
            return Err(DeployError::StepFailed {
                index,
                step: step.name,
                message: e.to_string(),
            });
        }
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(step = %step.name, index, duration_ms, "step finished");

        results.push(StepResult {
            name: step.name,
            index,
            duration_ms,
        });
    }

    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
