//! Domain types for the provisioning orchestrator.
//!
//! This module contains the core data structures:
//! - Scope: execution context and provisioner identity
//! - Store / VarFile / Step: what a step definition describes
//! - Snapshot: persisted apply snapshots and plan handoff records
//! - Task: wire types exchanged with the remote executor
//! - Run: step outcomes and pipeline runs

pub mod run;
pub mod scope;
pub mod snapshot;
pub mod step;
pub mod store;
pub mod task;
pub mod var_file;

// Re-export commonly used types
pub use run::{OutputMap, PipelineRun, RunState, StepOutcome, StepStatus, OUTCOME_OUTPUT_NAME};
pub use scope::{entity_id, ExecutionContext, IdentifierRef, ScopeLevel};
pub use snapshot::{
    inherit_output_name, EncryptedRecord, EncryptionConfig, InheritOutput, TerraformConfig,
};
pub use step::{
    ConfigFiles, ConfigurationType, ExecutionSpec, PlanCommand, PlanConfiguration,
    PlanStepParameters, ProvisionParameters, StepKind, StepSpec,
};
pub use store::{FetchType, StoreConfig, StoreKind};
pub use task::{
    var_files_identifier, GitConnectionType, GitFetchFilesConfig, GitStoreDelegateConfig,
    TaskCommand, TaskDescriptor, TaskParameters, TaskResponse, UnitProgress,
    CONFIG_FILES_IDENTIFIER,
};
pub use var_file::{BackendConfigSpec, NamedVarFile, VarFileConfig, VarFileSpec};
