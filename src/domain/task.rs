//! Wire types exchanged with the remote executor.
//!
//! The orchestrator never runs the provisioning tool. It sends a
//! `TaskDescriptor` and later receives a `TaskResponse`. Fetch identifiers
//! (`CONFIG_FILES`, `VAR_FILES_<n>`) sent in the request come back as keys
//! of the response's commit map, so their assignment must be stable.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::snapshot::{EncryptedRecord, EncryptionConfig};
use super::step::PlanCommand;
use super::store::FetchType;

/// Reserved fetch identifier for the main config directory
pub const CONFIG_FILES_IDENTIFIER: &str = "CONFIG_FILES";

/// Task type understood by the remote executor
pub const TASK_TYPE: &str = "TERRAFORM_TASK_NG";

/// Fetch identifier of the `position`-th remote var file (1-based)
pub fn var_files_identifier(position: usize) -> String {
    format!("VAR_FILES_{}", position)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCommand {
    Plan,
    Apply,
    Destroy,
}

/// Whether a connector points at one repository or a whole account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitConnectionType {
    Account,
    Repo,
}

/// Fully resolved store, ready for the executor to clone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitStoreDelegateConfig {
    pub connector_name: String,

    /// Repository URL (always repo-scoped once resolved)
    pub url: String,
    pub connection_type: GitConnectionType,

    /// Credential material, passed through untouched
    #[serde(default)]
    pub credentials: serde_json::Value,

    pub fetch_type: FetchType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,

    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitFetchFilesConfig {
    pub identifier: String,
    pub succeed_if_file_not_found: bool,
    pub store: GitStoreDelegateConfig,
}

/// Parameters of one provisioning task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    pub entity_id: String,
    pub command: TaskCommand,

    #[serde(default)]
    pub workspace: Option<String>,

    pub config_files: GitFetchFilesConfig,

    /// In `VAR_FILES_1..N` order
    #[serde(default)]
    pub remote_var_files: Vec<GitFetchFilesConfig>,

    #[serde(default)]
    pub inline_var_files: Vec<String>,

    #[serde(default)]
    pub backend_config: Option<String>,

    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,

    /// Captured once when the task is built
    pub save_terraform_state_json: bool,

    #[serde(default)]
    pub current_state_file_id: Option<String>,

    #[serde(default)]
    pub plan_command: Option<PlanCommand>,

    #[serde(default)]
    pub plan_name: Option<String>,

    #[serde(default)]
    pub encryption_config: Option<EncryptionConfig>,

    #[serde(default)]
    pub encrypted_plan: Option<EncryptedRecord>,
}

/// What gets dispatched to the remote executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Format: "{pipeline_execution}:{entity}:{command_hash}"
    pub idempotency_key: String,
    pub task_type: String,

    /// Forwarded as-is; never enforced by the orchestrator
    pub timeout_ms: u64,
    pub parameters: TaskParameters,
}

impl TaskDescriptor {
    pub fn new(pipeline_execution_id: &str, parameters: TaskParameters, timeout: Duration) -> Self {
        let fingerprint = serde_json::to_string(&parameters).unwrap_or_default();
        let idempotency_key = format!(
            "{}:{}:{}",
            pipeline_execution_id,
            parameters.entity_id,
            hash_input(&fingerprint)
        );

        Self {
            idempotency_key,
            task_type: TASK_TYPE.to_string(),
            timeout_ms: timeout.as_millis() as u64,
            parameters,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Hash input content (first 16 hex chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Progress of one unit of work on the executor (fetch, init, plan...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProgress {
    pub unit_name: String,
    pub status: String,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Result reported by the remote executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// SUCCESS, FAILURE, RUNNING or QUEUED; anything else is a protocol error
    pub status: String,

    /// Fetch identifier -> commit actually checked out
    #[serde(default)]
    pub commit_id_for_config_files: HashMap<String, String>,

    /// Raw outputs JSON
    #[serde(default)]
    pub outputs: Option<String>,

    #[serde(default)]
    pub state_file_id: Option<String>,

    #[serde(default)]
    pub encrypted_plan: Option<EncryptedRecord>,

    #[serde(default)]
    pub unit_progress: Vec<UnitProgress>,

    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskResponse {
    pub fn commit_for(&self, identifier: &str) -> Option<&str> {
        self.commit_id_for_config_files
            .get(identifier)
            .map(String::as_str)
    }
}
