//! Inherited provisioning state.
//!
//! Two kinds of record survive between steps:
//! - apply snapshots (`TerraformConfig`), durable, one row per successful
//!   apply, removed wholesale by a successful destroy
//! - plan handoffs (`InheritOutput`), scoped to one pipeline execution
//!
//! Every transition is a whole-record insert or a bulk delete. Nothing
//! serializes concurrent applies against the same entity, so two
//! overlapping executions can both insert a snapshot; the latest
//! `created_at` wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{inherit_output_name, InheritOutput, TerraformConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No successful apply found for provisioner [{entity_id}]")]
    SnapshotNotFound { entity_id: String },

    #[error("Did not find any plan step for provisioner [{entity_id}] in execution [{pipeline_execution_id}]")]
    InheritOutputNotFound {
        entity_id: String,
        pipeline_execution_id: String,
    },

    #[error("State store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SnapshotNotFound { .. } | Self::InheritOutputNotFound { .. }
        )
    }
}

/// Keyed repository for apply snapshots and plan handoffs
#[async_trait]
pub trait InheritedStateStore: Send + Sync {
    /// Insert a snapshot. Never overwrites an earlier row.
    async fn save_apply_snapshot(&self, snapshot: TerraformConfig) -> Result<(), StoreError>;

    /// Snapshot with the greatest `created_at` for the entity
    async fn latest_apply_snapshot(&self, entity_id: &str) -> Result<TerraformConfig, StoreError>;

    /// All snapshots for the entity, in insertion order
    async fn apply_snapshots(&self, entity_id: &str) -> Result<Vec<TerraformConfig>, StoreError>;

    /// Remove every snapshot for the entity, returning how many were removed
    async fn delete_all_snapshots(&self, entity_id: &str) -> Result<usize, StoreError>;

    async fn save_inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
        output: InheritOutput,
    ) -> Result<(), StoreError>;

    async fn inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
    ) -> Result<InheritOutput, StoreError>;
}

/// Pick the current snapshot: greatest `created_at`, later rows win ties
pub(crate) fn latest_snapshot(
    entity_id: &str,
    snapshots: impl IntoIterator<Item = TerraformConfig>,
) -> Result<TerraformConfig, StoreError> {
    snapshots
        .into_iter()
        .filter(|s| s.entity_id == entity_id)
        .max_by_key(|s| s.created_at)
        .ok_or_else(|| StoreError::SnapshotNotFound {
            entity_id: entity_id.to_string(),
        })
}

/// In-process store, lost on exit
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    snapshots: Arc<RwLock<Vec<TerraformConfig>>>,
    /// (pipeline execution, output name) -> handoff
    inherit_outputs: Arc<RwLock<HashMap<(String, String), InheritOutput>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InheritedStateStore for MemoryStateStore {
    async fn save_apply_snapshot(&self, snapshot: TerraformConfig) -> Result<(), StoreError> {
        self.snapshots.write().await.push(snapshot);
        Ok(())
    }

    async fn latest_apply_snapshot(&self, entity_id: &str) -> Result<TerraformConfig, StoreError> {
        let snapshots = self.snapshots.read().await;
        latest_snapshot(entity_id, snapshots.iter().cloned())
    }

    async fn apply_snapshots(&self, entity_id: &str) -> Result<Vec<TerraformConfig>, StoreError> {
        Ok(self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn delete_all_snapshots(&self, entity_id: &str) -> Result<usize, StoreError> {
        let mut snapshots = self.snapshots.write().await;
        let before = snapshots.len();
        snapshots.retain(|s| s.entity_id != entity_id);
        Ok(before - snapshots.len())
    }

    async fn save_inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
        output: InheritOutput,
    ) -> Result<(), StoreError> {
        let key = (
            pipeline_execution_id.to_string(),
            inherit_output_name(entity_id),
        );
        self.inherit_outputs.write().await.insert(key, output);
        Ok(())
    }

    async fn inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
    ) -> Result<InheritOutput, StoreError> {
        let key = (
            pipeline_execution_id.to_string(),
            inherit_output_name(entity_id),
        );
        self.inherit_outputs
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::InheritOutputNotFound {
                entity_id: entity_id.to_string(),
                pipeline_execution_id: pipeline_execution_id.to_string(),
            })
    }
}
