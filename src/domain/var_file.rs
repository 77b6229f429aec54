//! Var-file and backend-config specifications.

use serde::{Deserialize, Serialize};

use super::store::StoreConfig;
use super::task::var_files_identifier;

/// A var file as written in a step definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VarFileSpec {
    /// Variables written directly in the step
    Inline {
        #[serde(default)]
        content: Option<String>,
    },

    /// Variables fetched from source control
    Remote {
        #[serde(default)]
        store: Option<StoreConfig>,
    },
}

/// A var file with its user-chosen name. Order in the step is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedVarFile {
    pub identifier: String,

    #[serde(flatten)]
    pub spec: VarFileSpec,
}

impl NamedVarFile {
    pub fn inline(identifier: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            spec: VarFileSpec::Inline {
                content: Some(content.into()),
            },
        }
    }

    pub fn remote(identifier: impl Into<String>, store: StoreConfig) -> Self {
        Self {
            identifier: identifier.into(),
            spec: VarFileSpec::Remote { store: Some(store) },
        }
    }
}

/// Normalized var file, as sent to the executor and persisted in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VarFileConfig {
    Inline {
        content: String,
    },

    /// `position` is 1-based and counts remote entries only
    Remote {
        store: StoreConfig,
        position: usize,
    },
}

impl VarFileConfig {
    /// Fetch identifier for remote entries (`VAR_FILES_<position>`)
    pub fn fetch_identifier(&self) -> Option<String> {
        match self {
            Self::Inline { .. } => None,
            Self::Remote { position, .. } => Some(var_files_identifier(*position)),
        }
    }
}

/// Where the provisioning tool keeps its remote state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfigSpec {
    Inline {
        #[serde(default)]
        content: Option<String>,
    },

    /// Accepted in definitions but not resolved; treated as absent
    Remote { store: StoreConfig },
}
