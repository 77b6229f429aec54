//! Task-parameter composition.
//!
//! A step's configuration can come from three places: its own spec, a plan
//! handoff, or the latest apply snapshot. All three are first normalized
//! into a `ResolvedConfiguration`, which the resolver then turns into
//! `TaskParameters` by resolving every store into a fetch request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::adapters::{ConnectorService, FeatureFlag, FeatureFlags, StateFileService};
use crate::domain::{
    BackendConfigSpec, EncryptedRecord, EncryptionConfig, ExecutionContext, ExecutionSpec,
    IdentifierRef, InheritOutput, PlanCommand, StoreConfig, TaskCommand, TaskParameters,
    TaskResponse, TerraformConfig, VarFileSpec, CONFIG_FILES_IDENTIFIER,
};

use super::error::StepError;
use super::git_fetch::ConfigFetchResolver;
use super::var_files::{resolve_var_file_configs, resolve_var_files, ResolvedVarFiles};

/// Step configuration with var files positioned and values normalized
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfiguration {
    pub config_files: StoreConfig,
    pub var_files: ResolvedVarFiles,
    pub backend_config: Option<String>,
    pub environment_variables: BTreeMap<String, String>,
    pub workspace: Option<String>,
    pub targets: Vec<String>,
}

impl ResolvedConfiguration {
    /// Normalize a step's own spec. The main config store is required.
    pub fn from_spec(spec: &ExecutionSpec) -> Result<Self, StepError> {
        let config_files = spec.config_store().cloned().ok_or_else(|| {
            StepError::Configuration("Config files store is required".to_string())
        })?;

        Ok(Self {
            config_files,
            var_files: resolve_var_files(&spec.var_files),
            backend_config: resolve_backend_config(spec.backend_config.as_ref()),
            environment_variables: coerce_environment_variables(&spec.environment_variables),
            workspace: spec.workspace.clone(),
            targets: spec.targets.clone(),
        })
    }

    pub fn from_inherit_output(output: &InheritOutput) -> Self {
        Self {
            config_files: output.config_files.clone(),
            var_files: resolve_var_file_configs(&output.var_file_configs),
            backend_config: output.backend_config.clone(),
            environment_variables: output.environment_variables.clone(),
            workspace: output.workspace.clone(),
            targets: output.targets.clone(),
        }
    }

    pub fn from_snapshot(snapshot: &TerraformConfig) -> Self {
        Self {
            config_files: snapshot.config_files.clone(),
            var_files: resolve_var_file_configs(&snapshot.var_file_configs),
            backend_config: snapshot.backend_config.clone(),
            environment_variables: snapshot.environment_variables.clone(),
            workspace: snapshot.workspace.clone(),
            targets: snapshot.targets.clone(),
        }
    }

    /// Apply snapshot with stores pinned to the commits the executor fetched
    pub fn to_snapshot(
        &self,
        ctx: &ExecutionContext,
        entity_id: &str,
        response: &TaskResponse,
    ) -> TerraformConfig {
        TerraformConfig {
            account_id: ctx.account_id.clone(),
            org_id: ctx.org_id.clone(),
            project_id: ctx.project_id.clone(),
            entity_id: entity_id.to_string(),
            pipeline_execution_id: ctx.pipeline_execution_id.clone(),
            created_at: Utc::now(),
            config_files: self
                .config_files
                .at_commit(response.commit_for(CONFIG_FILES_IDENTIFIER)),
            var_file_configs: self.var_files.pin_to_commits(response),
            backend_config: self.backend_config.clone(),
            environment_variables: self.environment_variables.clone(),
            workspace: self.workspace.clone(),
            targets: self.targets.clone(),
        }
    }

    /// Plan handoff for a later apply or destroy in the same execution
    pub fn to_inherit_output(
        &self,
        response: &TaskResponse,
        encryption_config: EncryptionConfig,
        plan_name: String,
    ) -> InheritOutput {
        InheritOutput {
            config_files: self
                .config_files
                .at_commit(response.commit_for(CONFIG_FILES_IDENTIFIER)),
            var_file_configs: self.var_files.pin_to_commits(response),
            backend_config: self.backend_config.clone(),
            environment_variables: self.environment_variables.clone(),
            workspace: self.workspace.clone(),
            targets: self.targets.clone(),
            encrypted_plan: response.encrypted_plan.clone(),
            encryption_config,
            plan_name,
        }
    }
}

/// Plan-specific fields carried on a task
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub plan_command: Option<PlanCommand>,
    pub plan_name: Option<String>,
    pub encryption_config: Option<EncryptionConfig>,
    pub encrypted_plan: Option<EncryptedRecord>,
}

pub struct ConfigurationResolver {
    fetch: ConfigFetchResolver,
    state_files: Arc<dyn StateFileService>,
    feature_flags: Arc<dyn FeatureFlags>,
}

impl ConfigurationResolver {
    pub fn new(
        connectors: Arc<dyn ConnectorService>,
        state_files: Arc<dyn StateFileService>,
        feature_flags: Arc<dyn FeatureFlags>,
    ) -> Self {
        Self {
            fetch: ConfigFetchResolver::new(connectors),
            state_files,
            feature_flags,
        }
    }

    /// Build the parameter bundle for one task.
    ///
    /// The state-json flag is read here, once; a later flag change does not
    /// affect a task already built.
    #[instrument(skip(self, ctx, config, plan), fields(entity_id = %entity_id, command = ?command))]
    pub async fn build_parameters(
        &self,
        ctx: &ExecutionContext,
        entity_id: &str,
        command: TaskCommand,
        config: &ResolvedConfiguration,
        plan: PlanContext,
    ) -> Result<TaskParameters, StepError> {
        let config_files = self
            .fetch
            .resolve(ctx, &config.config_files, CONFIG_FILES_IDENTIFIER)
            .await?;

        let mut remote_var_files = Vec::new();
        for remote in config.var_files.remote_files() {
            remote_var_files.push(
                self.fetch
                    .resolve(ctx, remote.store, &remote.identifier)
                    .await?,
            );
        }

        let save_terraform_state_json = self
            .feature_flags
            .is_enabled(FeatureFlag::SaveTerraformStateJson, &ctx.account_id);
        let current_state_file_id = self.state_files.latest_file_id(entity_id).await?;

        debug!(
            remote_var_files = remote_var_files.len(),
            save_terraform_state_json, "Built task parameters"
        );

        Ok(TaskParameters {
            entity_id: entity_id.to_string(),
            command,
            workspace: config.workspace.clone(),
            config_files,
            remote_var_files,
            inline_var_files: config.var_files.inline_contents(),
            backend_config: config.backend_config.clone(),
            targets: config.targets.clone(),
            environment_variables: config.environment_variables.clone(),
            save_terraform_state_json,
            current_state_file_id,
            plan_command: plan.plan_command,
            plan_name: plan.plan_name,
            encryption_config: plan.encryption_config,
            encrypted_plan: plan.encrypted_plan,
        })
    }
}

/// Connectors a step definition refers to (main config, then remote var
/// files in order), for access checks by the caller
pub fn connector_references(
    ctx: &ExecutionContext,
    spec: &ExecutionSpec,
) -> Result<Vec<IdentifierRef>, StepError> {
    let var_file_stores = spec.var_files.iter().filter_map(|file| match &file.spec {
        VarFileSpec::Remote { store } => store.as_ref(),
        VarFileSpec::Inline { .. } => None,
    });

    spec.config_store()
        .into_iter()
        .chain(var_file_stores)
        .map(|store| IdentifierRef::parse(&store.connector_ref, ctx))
        .collect()
}

/// Only inline backend config is supported; anything else is absent
pub fn resolve_backend_config(spec: Option<&BackendConfigSpec>) -> Option<String> {
    match spec? {
        BackendConfigSpec::Inline { content } => content.clone(),
        BackendConfigSpec::Remote { .. } => {
            debug!("Remote backend config is not supported, treating as absent");
            None
        }
    }
}

/// Environment values as text: strings verbatim, null as empty
pub fn coerce_environment_variables(
    variables: &BTreeMap<String, Value>,
) -> BTreeMap<String, String> {
    variables
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect()
}
