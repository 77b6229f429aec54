//! Step error taxonomy.
//!
//! Configuration errors and missing stored state are raised before
//! anything is dispatched. Protocol errors mean the executor answered
//! outside the agreed contract. Nothing here is retried.

use thiserror::Error;

use crate::adapters::GatewayError;

use super::state_store::StoreError;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Protocol mismatch with remote executor: {0}")]
    Protocol(String),

    #[error("Remote execution failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StepError {
    /// True for missing snapshots, missing plan handoffs and similar
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_not_found(),
            Self::Configuration(_) | Self::Protocol(_) | Self::Gateway(_) => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_comes_from_the_store() {
        let missing = StepError::from(StoreError::SnapshotNotFound {
            entity_id: "acc/org/proj/network".to_string(),
        });
        assert!(missing.is_not_found());
        assert!(!missing.is_configuration());

        let invalid = StepError::Configuration("Plan command is required".to_string());
        assert!(!invalid.is_not_found());
        assert!(invalid.is_configuration());
    }
}
