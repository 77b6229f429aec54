//! Adapter interfaces for external collaborators.
//!
//! The orchestrator talks to the outside world only through these traits:
//! the remote execution gateway, connector lookup, the state-file service
//! and feature flags.

pub mod connectors;
pub mod feature_flags;
pub mod http;
pub mod state_files;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{TaskDescriptor, TaskResponse};

pub use connectors::{Connector, ConnectorService, StaticConnectors};
pub use feature_flags::{FeatureFlag, FeatureFlags, StaticFeatureFlags};
pub use http::HttpTaskGateway;
pub use state_files::{MemoryStateFiles, StateFileService};

/// Failure to obtain a result from the remote executor
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task rejected by executor ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode executor response: {0}")]
    Decode(String),
}

/// Dispatch boundary to the remote executor.
///
/// `submit` resolves once the executor has a result for the task. Retries,
/// heartbeats and queueing are the gateway's business; callers treat any
/// error as final.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Human-readable gateway name
    fn name(&self) -> &str;

    async fn submit(&self, task: &TaskDescriptor) -> Result<TaskResponse, GatewayError>;
}
