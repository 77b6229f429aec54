//! Store reference to fetch request resolution.
//!
//! Turns a `StoreConfig` into the fully specified `GitFetchFilesConfig` the
//! executor clones from. Fetch-type preconditions are checked before the
//! connector is looked up, so an invalid store never reaches the network.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::adapters::{Connector, ConnectorService};
use crate::domain::{
    ExecutionContext, FetchType, GitConnectionType, GitFetchFilesConfig, GitStoreDelegateConfig,
    IdentifierRef, StoreConfig, CONFIG_FILES_IDENTIFIER,
};

use super::error::StepError;

pub struct ConfigFetchResolver {
    connectors: Arc<dyn ConnectorService>,
}

impl ConfigFetchResolver {
    pub fn new(connectors: Arc<dyn ConnectorService>) -> Self {
        Self { connectors }
    }

    /// Resolve `store` into a fetch request tagged with `identifier`.
    ///
    /// `CONFIG_FILES` sends the store's single folder path; any other
    /// identifier sends the full path list.
    #[instrument(skip(self, ctx, store), fields(connector = %store.connector_ref))]
    pub async fn resolve(
        &self,
        ctx: &ExecutionContext,
        store: &StoreConfig,
        identifier: &str,
    ) -> Result<GitFetchFilesConfig, StepError> {
        validate_fetch_type(store)?;
        let paths = fetch_paths(store, identifier)?;

        let reference = IdentifierRef::parse(&store.connector_ref, ctx)?;
        let connector = self.connectors.get_connector(&reference).await?;
        if connector.kind != store.kind {
            return Err(StepError::Configuration(format!(
                "Invalid connector type for [{}]",
                identifier
            )));
        }

        let url = repository_url(&connector, store)?;
        debug!(identifier = %identifier, url = %url, "Resolved fetch request");

        Ok(GitFetchFilesConfig {
            identifier: identifier.to_string(),
            succeed_if_file_not_found: false,
            store: GitStoreDelegateConfig {
                connector_name: connector.name,
                url,
                connection_type: GitConnectionType::Repo,
                credentials: connector.credentials,
                fetch_type: store.fetch_type.clone(),
                branch: match store.fetch_type {
                    FetchType::Branch => store.branch.clone(),
                    _ => None,
                },
                commit_id: match store.fetch_type {
                    FetchType::Commit => store.commit_id.clone(),
                    _ => None,
                },
                paths,
            },
        })
    }
}

/// Check that the store names something fetchable
pub fn validate_fetch_type(store: &StoreConfig) -> Result<(), StepError> {
    match &store.fetch_type {
        FetchType::Branch if is_blank(store.branch.as_deref()) => Err(StepError::Configuration(
            "Branch is empty in store config".to_string(),
        )),
        FetchType::Commit if is_blank(store.commit_id.as_deref()) => Err(
            StepError::Configuration("Commit id is empty in store config".to_string()),
        ),
        FetchType::Branch | FetchType::Commit => Ok(()),
        FetchType::Unsupported(raw) => Err(StepError::Configuration(format!(
            "Unrecognized git fetch type: [{}]",
            raw
        ))),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn fetch_paths(store: &StoreConfig, identifier: &str) -> Result<Vec<String>, StepError> {
    if identifier != CONFIG_FILES_IDENTIFIER {
        return Ok(store.paths.clone());
    }

    store
        .folder_path
        .as_ref()
        .filter(|p| !p.trim().is_empty())
        .map(|p| vec![p.clone()])
        .ok_or_else(|| {
            StepError::Configuration("Folder path is required for config files".to_string())
        })
}

/// Repo-scoped URL for the connector; account connectors need a repo name
fn repository_url(connector: &Connector, store: &StoreConfig) -> Result<String, StepError> {
    match connector.connection_type {
        GitConnectionType::Repo => Ok(connector.url.clone()),
        GitConnectionType::Account => {
            let repo_name = store
                .repo_name
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| {
                    StepError::Configuration(format!(
                        "Repo name is required for account level connector [{}]",
                        connector.name
                    ))
                })?;
            Ok(account_repo_url(&connector.url, repo_name))
        }
    }
}

/// Join an account base URL and a repo name with exactly one slash
pub fn account_repo_url(base_url: &str, repo_name: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        repo_name.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoreKind;

    fn store(fetch_type: &str) -> StoreConfig {
        StoreConfig {
            kind: StoreKind::Git,
            connector_ref: "git".to_string(),
            fetch_type: FetchType::from(fetch_type.to_string()),
            branch: Some("main".to_string()),
            commit_id: None,
            folder_path: Some("tf/".to_string()),
            paths: vec!["a.tfvars".to_string(), "b.tfvars".to_string()],
            repo_name: None,
        }
    }

    #[test]
    fn test_account_repo_url_slashes() {
        assert_eq!(
            account_repo_url("https://git.example.com/org/", "/myrepo"),
            "https://git.example.com/org/myrepo"
        );
        assert_eq!(
            account_repo_url("https://git.example.com/org///", "myrepo"),
            "https://git.example.com/org/myrepo"
        );
    }

    #[test]
    fn test_validate_fetch_type() {
        assert!(validate_fetch_type(&store("branch")).is_ok());

        let mut no_branch = store("branch");
        no_branch.branch = Some("  ".to_string());
        assert!(validate_fetch_type(&no_branch).unwrap_err().is_configuration());

        let no_commit = store("commit");
        assert!(validate_fetch_type(&no_commit).is_err());

        let err = validate_fetch_type(&store("tag")).unwrap_err();
        assert!(err.to_string().contains("Unrecognized git fetch type: [tag]"));
    }

    #[test]
    fn test_fetch_paths_by_identifier() {
        let s = store("branch");
        assert_eq!(
            fetch_paths(&s, CONFIG_FILES_IDENTIFIER).unwrap(),
            vec!["tf/".to_string()]
        );
        assert_eq!(fetch_paths(&s, "VAR_FILES_1").unwrap().len(), 2);

        let mut no_folder = store("branch");
        no_folder.folder_path = None;
        assert!(fetch_paths(&no_folder, CONFIG_FILES_IDENTIFIER).is_err());
    }
}
