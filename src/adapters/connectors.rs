//! Source-control connector lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::StepError;
use crate::domain::{GitConnectionType, IdentifierRef, StoreKind};

/// A configured source-control connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    /// Display name, sent along with fetch requests
    pub name: String,

    pub kind: StoreKind,

    /// Repository URL, or base URL for account-scoped connectors
    pub url: String,

    pub connection_type: GitConnectionType,

    /// Credential material, opaque to the orchestrator
    #[serde(default)]
    pub credentials: serde_json::Value,
}

/// Resolves connector references to connectors
#[async_trait]
pub trait ConnectorService: Send + Sync {
    async fn get_connector(&self, reference: &IdentifierRef) -> Result<Connector, StepError>;
}

/// Connectors defined up front (config file or tests)
#[derive(Debug, Clone, Default)]
pub struct StaticConnectors {
    connectors: HashMap<String, Connector>,
}

impl StaticConnectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under a qualified key (`acc/org/proj/x`) or the
    /// reference as steps write it (`account.x`, `org.x`, `x`)
    pub fn with_connector(mut self, key: impl Into<String>, connector: Connector) -> Self {
        self.connectors.insert(key.into(), connector);
        self
    }

    pub fn from_map(connectors: HashMap<String, Connector>) -> Self {
        Self { connectors }
    }
}

#[async_trait]
impl ConnectorService for StaticConnectors {
    async fn get_connector(&self, reference: &IdentifierRef) -> Result<Connector, StepError> {
        self.connectors
            .get(&reference.qualified())
            .or_else(|| self.connectors.get(&reference.scoped()))
            .cloned()
            .ok_or_else(|| {
                StepError::Configuration(format!(
                    "Connector not found: [{}]",
                    reference.qualified()
                ))
            })
    }
}
