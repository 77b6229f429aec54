//! Per-step state machine for plan, apply and destroy.
//!
//! A step runs in two halves: `obtain_task` builds the descriptor handed to
//! the remote executor, and `handle_result` reconciles whatever came back
//! into persisted state and a `StepOutcome`. Every configuration problem is
//! raised by the first half, before anything is dispatched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::adapters::{ConnectorService, FeatureFlags, GatewayError, StateFileService, TaskGateway};
use crate::domain::{
    ConfigurationType, EncryptionConfig, ExecutionContext, IdentifierRef, PlanCommand,
    PlanStepParameters, ProvisionParameters, StepOutcome, StepSpec, StepStatus, TaskCommand,
    TaskDescriptor, TaskResponse,
};

use super::configuration::{ConfigurationResolver, PlanContext, ResolvedConfiguration};
use super::error::StepError;
use super::outputs::parse_outputs;
use super::state_store::InheritedStateStore;

/// A step with its configuration source resolved
struct PreparedStep {
    entity_id: String,
    command: TaskCommand,
    config: ResolvedConfiguration,
    plan: PlanContext,
}

pub struct StepController {
    state_store: Arc<dyn InheritedStateStore>,
    state_files: Arc<dyn StateFileService>,
    gateway: Arc<dyn TaskGateway>,
    configuration: ConfigurationResolver,
}

impl StepController {
    pub fn new(
        state_store: Arc<dyn InheritedStateStore>,
        gateway: Arc<dyn TaskGateway>,
        connectors: Arc<dyn ConnectorService>,
        state_files: Arc<dyn StateFileService>,
        feature_flags: Arc<dyn FeatureFlags>,
    ) -> Self {
        Self {
            configuration: ConfigurationResolver::new(
                connectors,
                Arc::clone(&state_files),
                feature_flags,
            ),
            state_store,
            state_files,
            gateway,
        }
    }

    /// Build and dispatch a step, then reconcile its result.
    ///
    /// Never fails: every error becomes a failed outcome carrying the
    /// message verbatim and whatever unit progress the executor reported.
    #[instrument(skip(self, ctx, step), fields(step = %step.kind(), provisioner = %step.provisioner_identifier()))]
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        step: &StepSpec,
        timeout: Duration,
    ) -> StepOutcome {
        let task = match self.obtain_task(ctx, step, timeout).await {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "Step rejected before dispatch");
                return StepOutcome::failed(e.to_string(), Vec::new());
            }
        };

        info!(
            idempotency_key = %task.idempotency_key,
            gateway = self.gateway.name(),
            "Dispatching task"
        );
        let result = self.gateway.submit(&task).await;
        let progress = result
            .as_ref()
            .map(|r| r.unit_progress.clone())
            .unwrap_or_default();

        match self.handle_result(ctx, step, result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Step failed");
                StepOutcome::failed(e.to_string(), progress)
            }
        }
    }

    /// Build the task descriptor for a step without dispatching it
    #[instrument(skip(self, ctx, step), fields(step = %step.kind(), provisioner = %step.provisioner_identifier()))]
    pub async fn obtain_task(
        &self,
        ctx: &ExecutionContext,
        step: &StepSpec,
        timeout: Duration,
    ) -> Result<TaskDescriptor, StepError> {
        validate_step(step)?;
        let prepared = self.prepare(ctx, step).await?;

        let parameters = self
            .configuration
            .build_parameters(
                ctx,
                &prepared.entity_id,
                prepared.command,
                &prepared.config,
                prepared.plan,
            )
            .await?;

        Ok(TaskDescriptor::new(
            &ctx.pipeline_execution_id,
            parameters,
            timeout,
        ))
    }

    /// Reconcile an executor result into persisted state and an outcome.
    ///
    /// Errors retrieving the result are returned as-is; nothing is retried.
    #[instrument(skip(self, ctx, step, result), fields(step = %step.kind(), provisioner = %step.provisioner_identifier()))]
    pub async fn handle_result(
        &self,
        ctx: &ExecutionContext,
        step: &StepSpec,
        result: Result<TaskResponse, GatewayError>,
    ) -> Result<StepOutcome, StepError> {
        let response = result?;
        let status = map_status(&response.status)?;
        let progress = response.unit_progress.clone();

        match status {
            StepStatus::Succeeded => {
                if let Err(e) = self.reconcile_success(ctx, step, &response).await {
                    warn!(error = %e, "Failed to record successful result");
                    return Ok(StepOutcome::failed(e.to_string(), progress));
                }
                let outputs = parse_outputs(response.outputs.as_deref().unwrap_or_default());
                info!(outputs = outputs.len(), "Step succeeded");
                Ok(StepOutcome::new(status, progress).with_outputs(outputs))
            }
            StepStatus::Failed => {
                let message = response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("{} failed on the remote executor", step.kind()));
                Ok(StepOutcome::failed(message, progress))
            }
            StepStatus::Running | StepStatus::Queued => Ok(StepOutcome::new(status, progress)),
        }
    }

    async fn reconcile_success(
        &self,
        ctx: &ExecutionContext,
        step: &StepSpec,
        response: &TaskResponse,
    ) -> Result<(), StepError> {
        match step {
            StepSpec::Plan(params) => {
                let prepared = self.prepare_plan(ctx, params)?;
                let encryption_config = prepared.plan.encryption_config.clone().ok_or_else(|| {
                    StepError::Configuration("Secret manager ref is required for plan".to_string())
                })?;
                let plan_name = prepared.plan.plan_name.clone().unwrap_or_default();

                let output = prepared
                    .config
                    .to_inherit_output(response, encryption_config, plan_name);
                self.state_store
                    .save_inherit_output(&prepared.entity_id, &ctx.pipeline_execution_id, output)
                    .await?;
                debug!(entity_id = %prepared.entity_id, "Saved plan handoff");
            }
            StepSpec::Apply(params) => {
                let prepared = self.prepare_provision(ctx, params, TaskCommand::Apply).await?;
                let snapshot = prepared
                    .config
                    .to_snapshot(ctx, &prepared.entity_id, response);
                self.state_store.save_apply_snapshot(snapshot).await?;
                self.advance_state_file(&prepared.entity_id, response).await?;
                debug!(entity_id = %prepared.entity_id, "Saved apply snapshot");
            }
            StepSpec::Destroy(params) => {
                let entity_id = ctx.entity_id(&params.provisioner_identifier);
                let removed = self.state_store.delete_all_snapshots(&entity_id).await?;
                self.advance_state_file(&entity_id, response).await?;
                debug!(entity_id = %entity_id, removed, "Removed apply snapshots");
            }
        }
        Ok(())
    }

    async fn advance_state_file(
        &self,
        entity_id: &str,
        response: &TaskResponse,
    ) -> Result<(), StepError> {
        if let Some(state_file_id) = response.state_file_id.as_deref() {
            self.state_files
                .update_parent_entity(entity_id, state_file_id)
                .await?;
        }
        Ok(())
    }

    async fn prepare(
        &self,
        ctx: &ExecutionContext,
        step: &StepSpec,
    ) -> Result<PreparedStep, StepError> {
        match step {
            StepSpec::Plan(params) => self.prepare_plan(ctx, params),
            StepSpec::Apply(params) => self.prepare_provision(ctx, params, TaskCommand::Apply).await,
            StepSpec::Destroy(params) => {
                self.prepare_provision(ctx, params, TaskCommand::Destroy)
                    .await
            }
        }
    }

    fn prepare_plan(
        &self,
        ctx: &ExecutionContext,
        params: &PlanStepParameters,
    ) -> Result<PreparedStep, StepError> {
        let configuration = params.configuration.as_ref().ok_or_else(|| {
            StepError::Configuration("Plan configuration is required".to_string())
        })?;
        let plan_command = configuration.command.ok_or_else(|| {
            StepError::Configuration("Plan command is required".to_string())
        })?;
        let secret_manager_ref = configuration.secret_manager_ref.as_deref().ok_or_else(|| {
            StepError::Configuration("Secret manager ref is required for plan".to_string())
        })?;
        let encryption_config =
            EncryptionConfig::from(IdentifierRef::parse(secret_manager_ref, ctx)?);

        Ok(PreparedStep {
            entity_id: ctx.entity_id(&params.provisioner_identifier),
            command: TaskCommand::Plan,
            config: ResolvedConfiguration::from_spec(&configuration.spec)?,
            plan: PlanContext {
                plan_command: Some(plan_command),
                plan_name: Some(plan_name(plan_command, &ctx.pipeline_execution_id)),
                encryption_config: Some(encryption_config),
                encrypted_plan: None,
            },
        })
    }

    async fn prepare_provision(
        &self,
        ctx: &ExecutionContext,
        params: &ProvisionParameters,
        command: TaskCommand,
    ) -> Result<PreparedStep, StepError> {
        let entity_id = ctx.entity_id(&params.provisioner_identifier);

        let (config, plan) = match (command, params.configuration_type) {
            (_, ConfigurationType::Inline) => {
                let spec = params.spec.as_ref().ok_or_else(|| {
                    StepError::Configuration(format!(
                        "Spec is required for configuration type {}",
                        ConfigurationType::Inline
                    ))
                })?;
                (ResolvedConfiguration::from_spec(spec)?, PlanContext::default())
            }
            (_, ConfigurationType::InheritFromPlan) => {
                let output = self
                    .state_store
                    .inherit_output(&entity_id, &ctx.pipeline_execution_id)
                    .await?;
                let plan = PlanContext {
                    plan_command: None,
                    plan_name: Some(output.plan_name.clone()),
                    encryption_config: Some(output.encryption_config.clone()),
                    encrypted_plan: output.encrypted_plan.clone(),
                };
                (ResolvedConfiguration::from_inherit_output(&output), plan)
            }
            (TaskCommand::Destroy, ConfigurationType::InheritFromApply) => {
                let snapshot = self.state_store.latest_apply_snapshot(&entity_id).await?;
                (
                    ResolvedConfiguration::from_snapshot(&snapshot),
                    PlanContext::default(),
                )
            }
            (TaskCommand::Apply | TaskCommand::Plan, ConfigurationType::InheritFromApply) => {
                return Err(StepError::Configuration(format!(
                    "Unknown configuration type {} for {}",
                    params.configuration_type,
                    step_name(command)
                )));
            }
        };

        Ok(PreparedStep {
            entity_id,
            command,
            config,
            plan,
        })
    }
}

/// Structural checks that need no store or connector access
pub fn validate_step(step: &StepSpec) -> Result<(), StepError> {
    let missing = |what: &str| -> Result<(), StepError> {
        Err(StepError::Configuration(format!(
            "{} is required for {} step [{}]",
            what,
            step.kind(),
            step.provisioner_identifier()
        )))
    };

    if step.provisioner_identifier().trim().is_empty() {
        return missing("Provisioner identifier");
    }

    match step {
        StepSpec::Plan(params) => match &params.configuration {
            None => missing("Configuration"),
            Some(config) if config.spec.config_store().is_none() => missing("Config files store"),
            Some(config) if config.command.is_none() => missing("Plan command"),
            Some(config) if config.secret_manager_ref.is_none() => missing("Secret manager ref"),
            Some(_) => Ok(()),
        },
        StepSpec::Apply(params) | StepSpec::Destroy(params) => {
            match (params.configuration_type, &params.spec) {
                (ConfigurationType::Inline, None) => missing("Spec"),
                (ConfigurationType::Inline, Some(spec)) if spec.config_store().is_none() => {
                    missing("Config files store")
                }
                _ => Ok(()),
            }
        }
    }
}

/// Map the executor's status string onto a step status
pub fn map_status(status: &str) -> Result<StepStatus, StepError> {
    match status {
        "SUCCESS" => Ok(StepStatus::Succeeded),
        "FAILURE" => Ok(StepStatus::Failed),
        "RUNNING" => Ok(StepStatus::Running),
        "QUEUED" => Ok(StepStatus::Queued),
        other => Err(StepError::Protocol(format!(
            "Unhandled command execution status: {}",
            other
        ))),
    }
}

/// Name under which a plan is stored on the executor side
pub fn plan_name(command: PlanCommand, pipeline_execution_id: &str) -> String {
    let prefix = match command {
        PlanCommand::Apply => "apply-plan",
        PlanCommand::Destroy => "destroy-plan",
    };
    format!("{}-{}", prefix, pipeline_execution_id)
}

fn step_name(command: TaskCommand) -> &'static str {
    match command {
        TaskCommand::Plan => "plan",
        TaskCommand::Apply => "apply",
        TaskCommand::Destroy => "destroy",
    }
}
