//! Main orchestrator for pipeline execution.
//!
//! Runs provisioning steps in order within one pipeline execution and
//! stops at the first step that does not succeed.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{ExecutionContext, PipelineRun, RunState, StepStatus};

use super::controller::StepController;
use super::pipeline::ProvisionPipeline;

/// Main pipeline orchestrator
pub struct Orchestrator {
    controller: StepController,

    /// Timeout for steps that do not set their own
    default_timeout: Duration,
}

impl Orchestrator {
    pub fn new(controller: StepController, default_timeout: Duration) -> Self {
        Self {
            controller,
            default_timeout,
        }
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    /// Execute a pipeline under a fresh pipeline-execution id
    #[instrument(skip(self, pipeline), fields(pipeline = %pipeline.name))]
    pub async fn run_pipeline(
        &self,
        pipeline: &ProvisionPipeline,
        account_id: &str,
        org_id: &str,
        project_id: &str,
    ) -> Result<PipelineRun> {
        let execution_id = Uuid::new_v4().to_string();
        let ctx = ExecutionContext::new(account_id, org_id, project_id, execution_id);
        self.run_in_context(pipeline, &ctx).await
    }

    /// Execute a pipeline under an existing execution context
    pub async fn run_in_context(
        &self,
        pipeline: &ProvisionPipeline,
        ctx: &ExecutionContext,
    ) -> Result<PipelineRun> {
        pipeline.validate()?;

        let mut run = PipelineRun::new(ctx.pipeline_execution_id.clone(), pipeline.name.clone());
        info!(execution_id = %run.id, steps = pipeline.steps.len(), "Starting pipeline execution");

        for step in &pipeline.steps {
            let outcome = self
                .controller
                .execute(ctx, &step.spec, step.timeout(self.default_timeout))
                .await;
            let status = outcome.status;
            let reason = match (outcome.failure_message.clone(), status) {
                (Some(message), _) => message,
                (None, StepStatus::Running | StepStatus::Queued) => {
                    format!("step left unreconciled with status {:?}", status)
                }
                (None, _) => format!("step ended with status {:?}", status),
            };
            run.record(step.name.clone(), outcome);

            if matches!(status, StepStatus::Running | StepStatus::Queued) {
                warn!(
                    step = %step.name,
                    ?status,
                    "Step left unreconciled; a later executor result will not be recorded"
                );
            }

            if status != StepStatus::Succeeded {
                error!(step = %step.name, %reason, "Pipeline stopped");
                run.state = RunState::Stopped {
                    step: step.name.clone(),
                    reason,
                };
                run.completed_at = Some(Utc::now());
                return Ok(run);
            }

            info!(step = %step.name, "Step succeeded");
        }

        info!(execution_id = %run.id, "Pipeline completed successfully");
        run.state = RunState::Completed;
        run.completed_at = Some(Utc::now());
        Ok(run)
    }
}
