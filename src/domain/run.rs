//! Step outcomes and pipeline runs.
//!
//! A PipelineRun is one execution of a provisioning pipeline; each step
//! contributes a StepOutcome.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::UnitProgress;

/// Output name under which flattened provisioning outputs are exposed
pub const OUTCOME_OUTPUT_NAME: &str = "terraform";

/// Flattened provisioning outputs (`name -> value`)
pub type OutputMap = BTreeMap<String, serde_json::Value>;

/// Status of a step as seen by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Running,
    Queued,
}

impl StepStatus {
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

/// What a step reports back to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,

    /// Unit-level progress from the executor, kept even on failure
    #[serde(default)]
    pub unit_progress: Vec<UnitProgress>,

    /// Named outputs for downstream expressions (succeeded steps only)
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputMap>,

    #[serde(default)]
    pub failure_message: Option<String>,
}

impl StepOutcome {
    pub fn new(status: StepStatus, unit_progress: Vec<UnitProgress>) -> Self {
        Self {
            status,
            unit_progress,
            outputs: BTreeMap::new(),
            failure_message: None,
        }
    }

    /// A failed outcome carrying `message` verbatim
    pub fn failed(message: impl Into<String>, unit_progress: Vec<UnitProgress>) -> Self {
        Self {
            failure_message: Some(message.into()),
            ..Self::new(StepStatus::Failed, unit_progress)
        }
    }

    pub fn with_outputs(mut self, outputs: OutputMap) -> Self {
        self.outputs.insert(OUTCOME_OUTPUT_NAME.to_string(), outputs);
        self
    }

    /// Flattened outputs published under the well-known name
    pub fn provisioning_outputs(&self) -> Option<&OutputMap> {
        self.outputs.get(OUTCOME_OUTPUT_NAME)
    }
}

/// One execution of a provisioning pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Pipeline execution id; scopes plan handoff records
    pub id: String,

    pub pipeline_name: String,

    pub state: RunState,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Outcomes in step order (step_name, outcome)
    pub step_outcomes: Vec<(String, StepOutcome)>,
}

impl PipelineRun {
    pub fn new(id: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipeline_name: pipeline_name.into(),
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            step_outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, step_name: impl Into<String>, outcome: StepOutcome) {
        self.step_outcomes.push((step_name.into(), outcome));
    }

    pub fn outcome(&self, step_name: &str) -> Option<&StepOutcome> {
        self.step_outcomes
            .iter()
            .find(|(name, _)| name == step_name)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    Running,

    Completed,

    /// Stopped at `step` (failed, or still pending on the executor)
    Stopped { step: String, reason: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
