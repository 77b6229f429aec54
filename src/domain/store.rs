//! Source-control store references.

use serde::{Deserialize, Serialize};

/// Kind of source-control store a config lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Git,
    Github,
    Gitlab,
    Bitbucket,
}

impl Default for StoreKind {
    fn default() -> Self {
        Self::Git
    }
}

/// How files are fetched from a store.
///
/// Only `branch` and `commit` are fetchable; anything else is kept verbatim
/// so it can be rejected with the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FetchType {
    Branch,
    Commit,
    Unsupported(String),
}

impl From<String> for FetchType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "branch" => Self::Branch,
            "commit" => Self::Commit,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<FetchType> for String {
    fn from(value: FetchType) -> Self {
        match value {
            FetchType::Branch => "branch".to_string(),
            FetchType::Commit => "commit".to_string(),
            FetchType::Unsupported(raw) => raw,
        }
    }
}

impl std::fmt::Display for FetchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Commit => write!(f, "commit"),
            Self::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

/// Pointer to files in a source-control repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// Connector reference (scoped, see `IdentifierRef`)
    pub connector_ref: String,

    pub fetch_type: FetchType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,

    /// Folder holding the main config (config-files stores only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,

    /// File paths (var-file stores)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// Repository name, required for account-scoped connectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
}

impl StoreConfig {
    /// Copy of this store pinned to `commit_id`.
    ///
    /// Stores already fetched by commit, or an absent/empty commit, are
    /// returned unchanged.
    pub fn at_commit(&self, commit_id: Option<&str>) -> StoreConfig {
        let mut pinned = self.clone();
        match commit_id {
            Some(commit) if !commit.is_empty() && self.fetch_type != FetchType::Commit => {
                pinned.fetch_type = FetchType::Commit;
                pinned.commit_id = Some(commit.to_string());
                pinned
            }
            _ => pinned,
        }
    }
}
