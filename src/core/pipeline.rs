//! Pipeline definitions and loading.
//!
//! Pipelines are defined in YAML and consist of ordered provisioning
//! steps (plan, apply, destroy) run within one pipeline execution.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::StepSpec;

use super::controller::validate_step;

/// A complete pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionPipeline {
    /// Pipeline name (used in CLI and logs)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Ordered list of steps to execute
    pub steps: Vec<PipelineStep>,
}

impl ProvisionPipeline {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Pipeline must have at least one step");
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.name.is_empty() {
                anyhow::bail!("Step {} has an empty name", i);
            }
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name '{}'", step.name);
            }
            validate_step(&step.spec).with_context(|| format!("Step '{}' is invalid", step.name))?;
        }

        Ok(())
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Step name (unique within pipeline)
    pub name: String,

    /// Forwarded to the executor; falls back to the gateway default
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(flatten)]
    pub spec: StepSpec,
}

impl PipelineStep {
    /// Load a single step from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read step file: {}", path.display()))?;

        serde_yaml::from_str(&content).context("Failed to parse step YAML")
    }

    /// Get the effective timeout for this step
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}
