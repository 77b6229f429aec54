//! Var-file resolution.
//!
//! Inline and remote var files are merged into one ordered list. Remote
//! entries get 1-based positions (`VAR_FILES_<n>`) that count remote entries
//! only; the executor echoes these identifiers back in its commit map, so
//! the same input order must always produce the same positions.

use crate::domain::{
    var_files_identifier, NamedVarFile, StoreConfig, TaskResponse, VarFileConfig, VarFileSpec,
};

/// A remote var file paired with its fetch identifier
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVarFile<'a> {
    pub identifier: String,
    pub store: &'a StoreConfig,
}

/// Ordered, positioned var files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedVarFiles {
    configs: Vec<VarFileConfig>,
}

enum Unpositioned {
    Inline(String),
    Remote(StoreConfig),
}

/// Resolve var files from a step definition.
///
/// Blank inline entries and remote entries without a store are dropped
/// and do not consume a position.
pub fn resolve_var_files(var_files: &[NamedVarFile]) -> ResolvedVarFiles {
    let entries = var_files.iter().filter_map(|file| match &file.spec {
        VarFileSpec::Inline { content } => {
            non_blank(content.as_deref()).map(Unpositioned::Inline)
        }
        VarFileSpec::Remote { store } => store.clone().map(Unpositioned::Remote),
    });

    ResolvedVarFiles {
        configs: assign_positions(entries),
    }
}

/// Re-resolve var files persisted in a snapshot or plan handoff.
///
/// Positions are derived again from order rather than trusted from storage.
pub fn resolve_var_file_configs(configs: &[VarFileConfig]) -> ResolvedVarFiles {
    let entries = configs.iter().filter_map(|config| match config {
        VarFileConfig::Inline { content } => {
            non_blank(Some(content.as_str())).map(Unpositioned::Inline)
        }
        VarFileConfig::Remote { store, .. } => Some(Unpositioned::Remote(store.clone())),
    });

    ResolvedVarFiles {
        configs: assign_positions(entries),
    }
}

fn non_blank(content: Option<&str>) -> Option<String> {
    content
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
}

fn assign_positions(entries: impl Iterator<Item = Unpositioned>) -> Vec<VarFileConfig> {
    entries
        .scan(0usize, |remotes_seen, entry| {
            Some(match entry {
                Unpositioned::Inline(content) => VarFileConfig::Inline { content },
                Unpositioned::Remote(store) => {
                    *remotes_seen += 1;
                    VarFileConfig::Remote {
                        store,
                        position: *remotes_seen,
                    }
                }
            })
        })
        .collect()
}

impl ResolvedVarFiles {
    pub fn configs(&self) -> &[VarFileConfig] {
        &self.configs
    }

    pub fn into_configs(self) -> Vec<VarFileConfig> {
        self.configs
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Inline contents, order preserved
    pub fn inline_contents(&self) -> Vec<String> {
        self.configs
            .iter()
            .filter_map(|config| match config {
                VarFileConfig::Inline { content } => Some(content.clone()),
                VarFileConfig::Remote { .. } => None,
            })
            .collect()
    }

    /// Remote var files in `VAR_FILES_1..N` order
    pub fn remote_files(&self) -> Vec<RemoteVarFile<'_>> {
        self.configs
            .iter()
            .filter_map(|config| match config {
                VarFileConfig::Remote { store, .. } => Some(store),
                VarFileConfig::Inline { .. } => None,
            })
            .enumerate()
            .map(|(idx, store)| RemoteVarFile {
                identifier: var_files_identifier(idx + 1),
                store,
            })
            .collect()
    }

    /// Var files with each remote store pinned to the commit the executor
    /// reported for its identifier.
    pub fn pin_to_commits(&self, response: &TaskResponse) -> Vec<VarFileConfig> {
        self.configs
            .iter()
            .map(|config| match config {
                VarFileConfig::Inline { .. } => config.clone(),
                VarFileConfig::Remote { store, position } => {
                    let identifier = var_files_identifier(*position);
                    VarFileConfig::Remote {
                        store: store.at_commit(response.commit_for(&identifier)),
                        position: *position,
                    }
                }
            })
            .collect()
    }
}
