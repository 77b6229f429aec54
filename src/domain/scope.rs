//! Execution scope and provisioner identity.
//!
//! Every persisted record is partitioned by an entity id derived from the
//! account/org/project scope and the provisioner identifier.

use serde::{Deserialize, Serialize};

use crate::core::StepError;

/// Scope of one pipeline execution (who is running, and which execution)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,

    /// Pipeline execution this step belongs to
    pub pipeline_execution_id: String,
}

impl ExecutionContext {
    pub fn new(
        account_id: impl Into<String>,
        org_id: impl Into<String>,
        project_id: impl Into<String>,
        pipeline_execution_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            org_id: org_id.into(),
            project_id: project_id.into(),
            pipeline_execution_id: pipeline_execution_id.into(),
        }
    }

    /// Entity id for a provisioner within this execution's scope
    pub fn entity_id(&self, provisioner_identifier: &str) -> String {
        entity_id(
            &self.account_id,
            &self.org_id,
            &self.project_id,
            provisioner_identifier,
        )
    }
}

/// Partition key for all state belonging to one provisioner.
///
/// Format: `{account}/{org}/{project}/{provisioner}`
pub fn entity_id(account_id: &str, org_id: &str, project_id: &str, provisioner: &str) -> String {
    format!("{}/{}/{}/{}", account_id, org_id, project_id, provisioner)
}

/// Level at which a scoped reference lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Account,
    Org,
    Project,
}

/// A reference such as `account.shared_git`, `org.vault` or `my_connector`
/// resolved against the execution scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRef {
    pub level: ScopeLevel,
    pub account_id: String,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub identifier: String,
}

impl IdentifierRef {
    /// Parse a scoped reference.
    ///
    /// A bare identifier is project level; `account.` and `org.` prefixes
    /// widen the scope.
    pub fn parse(raw: &str, ctx: &ExecutionContext) -> Result<Self, StepError> {
        let raw = raw.trim();
        let (level, identifier) = match raw.split_once('.') {
            None => (ScopeLevel::Project, raw),
            Some(("account", id)) => (ScopeLevel::Account, id),
            Some(("org", id)) => (ScopeLevel::Org, id),
            Some((prefix, _)) => {
                return Err(StepError::Configuration(format!(
                    "Invalid scope prefix [{}] in reference [{}]",
                    prefix, raw
                )))
            }
        };

        if identifier.is_empty() {
            return Err(StepError::Configuration(format!(
                "Reference [{}] has an empty identifier",
                raw
            )));
        }

        let (org_id, project_id) = match level {
            ScopeLevel::Account => (None, None),
            ScopeLevel::Org => (Some(ctx.org_id.clone()), None),
            ScopeLevel::Project => (Some(ctx.org_id.clone()), Some(ctx.project_id.clone())),
        };

        Ok(Self {
            level,
            account_id: ctx.account_id.clone(),
            org_id,
            project_id,
            identifier: identifier.to_string(),
        })
    }

    /// Fully qualified form, used as a lookup key
    pub fn qualified(&self) -> String {
        match self.level {
            ScopeLevel::Account => format!("{}/{}", self.account_id, self.identifier),
            ScopeLevel::Org => format!(
                "{}/{}/{}",
                self.account_id,
                self.org_id.as_deref().unwrap_or_default(),
                self.identifier
            ),
            ScopeLevel::Project => format!(
                "{}/{}/{}/{}",
                self.account_id,
                self.org_id.as_deref().unwrap_or_default(),
                self.project_id.as_deref().unwrap_or_default(),
                self.identifier
            ),
        }
    }

    /// Reference as written in a step: `account.x`, `org.x` or `x`
    pub fn scoped(&self) -> String {
        match self.level {
            ScopeLevel::Account => format!("account.{}", self.identifier),
            ScopeLevel::Org => format!("org.{}", self.identifier),
            ScopeLevel::Project => self.identifier.clone(),
        }
    }
}
