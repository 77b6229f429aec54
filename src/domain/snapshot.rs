//! Persisted provisioning state: apply snapshots and plan handoff records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::{IdentifierRef, ScopeLevel};
use super::store::StoreConfig;
use super::var_file::VarFileConfig;

/// Configuration used by one successful apply.
///
/// Rows are only ever inserted; the current state for an entity is the row
/// with the greatest `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerraformConfig {
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    pub entity_id: String,
    pub pipeline_execution_id: String,
    pub created_at: DateTime<Utc>,

    /// Main config, pinned to the fetched commit when one was reported
    pub config_files: StoreConfig,

    #[serde(default)]
    pub var_file_configs: Vec<VarFileConfig>,

    #[serde(default)]
    pub backend_config: Option<String>,

    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,

    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub targets: Vec<String>,
}

/// Secret manager that encrypts saved plans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub identifier: String,
    pub scope: ScopeLevel,

    /// Qualified reference (`account/org/project/identifier` style)
    pub reference: String,
}

impl From<IdentifierRef> for EncryptionConfig {
    fn from(r: IdentifierRef) -> Self {
        Self {
            reference: r.qualified(),
            identifier: r.identifier,
            scope: r.level,
        }
    }
}

/// Encrypted plan produced by the executor. Opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub name: String,

    /// Encrypted payload as reported by the executor
    pub encrypted_value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// Handoff from a plan step to a later apply/destroy in the same execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritOutput {
    pub config_files: StoreConfig,

    #[serde(default)]
    pub var_file_configs: Vec<VarFileConfig>,

    #[serde(default)]
    pub backend_config: Option<String>,

    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,

    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default)]
    pub encrypted_plan: Option<EncryptedRecord>,

    pub encryption_config: EncryptionConfig,

    pub plan_name: String,
}

/// Output name an inherit record is saved under
pub fn inherit_output_name(entity_id: &str) -> String {
    format!("inheritOutput_{}", entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::ExecutionContext;

    #[test]
    fn test_inherit_output_name() {
        assert_eq!(inherit_output_name("a/o/p/tf"), "inheritOutput_a/o/p/tf");
    }

    #[test]
    fn test_encryption_config_from_ref() {
        let ctx = ExecutionContext::new("acc", "org", "proj", "exec");
        let r = IdentifierRef::parse("org.vault", &ctx).unwrap();
        let config = EncryptionConfig::from(r);
        assert_eq!(config.identifier, "vault");
        assert_eq!(config.scope, ScopeLevel::Org);
        assert_eq!(config.reference, "acc/org/vault");
    }
}
