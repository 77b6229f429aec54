//! Core orchestration logic.
//!
//! This module contains:
//! - VarFiles / GitFetch / Configuration: task-parameter resolution
//! - StateStore / JsonlStore: inherited provisioning state and state-file
//!   pointers
//! - Controller: per-step plan/apply/destroy state machine
//! - Outputs: provisioning output flattening
//! - Pipeline / Orchestrator: pipeline definitions and execution

pub mod configuration;
pub mod controller;
pub mod error;
pub mod git_fetch;
pub mod jsonl_store;
pub mod orchestrator;
pub mod outputs;
pub mod pipeline;
pub mod state_store;
pub mod var_files;

// Re-export commonly used types
pub use configuration::{
    coerce_environment_variables, connector_references, resolve_backend_config,
    ConfigurationResolver, PlanContext, ResolvedConfiguration,
};
pub use controller::{map_status, plan_name, validate_step, StepController};
pub use error::StepError;
pub use git_fetch::{account_repo_url, validate_fetch_type, ConfigFetchResolver};
pub use jsonl_store::{JsonlStateFiles, JsonlStateStore};
pub use orchestrator::Orchestrator;
pub use outputs::parse_outputs;
pub use pipeline::{PipelineStep, ProvisionPipeline};
pub use state_store::{InheritedStateStore, MemoryStateStore, StoreError};
pub use var_files::{resolve_var_file_configs, resolve_var_files, RemoteVarFile, ResolvedVarFiles};
