//! Feature flags, evaluated per account.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    /// Ask the executor to also persist the plan as JSON
    SaveTerraformStateJson,
}

pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: FeatureFlag, account_id: &str) -> bool;
}

/// Flags enabled for a fixed list of accounts; `"*"` enables everywhere
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticFeatureFlags {
    #[serde(flatten)]
    enabled: HashMap<FeatureFlag, Vec<String>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, flag: FeatureFlag, account_id: impl Into<String>) -> Self {
        self.enabled.entry(flag).or_default().push(account_id.into());
        self
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn is_enabled(&self, flag: FeatureFlag, account_id: &str) -> bool {
        self.enabled
            .get(&flag)
            .map(|accounts| accounts.iter().any(|a| a == "*" || a == account_id))
            .unwrap_or(false)
    }
}
