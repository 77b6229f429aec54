//! Current state-file pointer per entity.
//!
//! The state files themselves live in an external file service; the
//! orchestrator only reads the latest id when building a task and advances
//! the pointer after a successful apply or destroy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::StoreError;

#[async_trait]
pub trait StateFileService: Send + Sync {
    async fn latest_file_id(&self, entity_id: &str) -> Result<Option<String>, StoreError>;

    async fn update_parent_entity(
        &self,
        entity_id: &str,
        state_file_id: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStateFiles {
    pointers: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStateFiles {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateFileService for MemoryStateFiles {
    async fn latest_file_id(&self, entity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.pointers.read().await.get(entity_id).cloned())
    }

    async fn update_parent_entity(
        &self,
        entity_id: &str,
        state_file_id: &str,
    ) -> Result<(), StoreError> {
        self.pointers
            .write()
            .await
            .insert(entity_id.to_string(), state_file_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pointer_advances() {
        let files = MemoryStateFiles::new();
        assert_eq!(files.latest_file_id("e").await.unwrap(), None);

        files.update_parent_entity("e", "f1").await.unwrap();
        files.update_parent_entity("e", "f2").await.unwrap();
        assert_eq!(files.latest_file_id("e").await.unwrap().as_deref(), Some("f2"));
    }
}
