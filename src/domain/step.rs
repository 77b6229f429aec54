//! Step definitions for plan, apply and destroy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::store::StoreConfig;
use super::var_file::{BackendConfigSpec, NamedVarFile};

/// Main config directory of a provisioner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFiles {
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

/// Everything needed to run the provisioning tool against one config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    #[serde(default)]
    pub workspace: Option<String>,

    #[serde(default)]
    pub config_files: Option<ConfigFiles>,

    /// Ordered; remote positions are assigned in this order
    #[serde(default)]
    pub var_files: Vec<NamedVarFile>,

    #[serde(default)]
    pub backend_config: Option<BackendConfigSpec>,

    #[serde(default)]
    pub targets: Vec<String>,

    /// Values of any scalar type; coerced to text when resolved
    #[serde(default)]
    pub environment_variables: BTreeMap<String, serde_json::Value>,
}

impl ExecutionSpec {
    /// Store of the main config, if the spec has one
    pub fn config_store(&self) -> Option<&StoreConfig> {
        self.config_files.as_ref().and_then(|c| c.store.as_ref())
    }
}

/// Where an apply/destroy step gets its configuration from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigurationType {
    /// The step's own spec
    Inline,

    /// The plan recorded earlier in the same pipeline execution
    InheritFromPlan,

    /// The latest successful apply snapshot
    InheritFromApply,
}

impl std::fmt::Display for ConfigurationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Inline => "INLINE",
            Self::InheritFromPlan => "INHERIT_FROM_PLAN",
            Self::InheritFromApply => "INHERIT_FROM_APPLY",
        };
        write!(f, "{}", name)
    }
}

/// What a plan is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCommand {
    Apply,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfiguration {
    #[serde(default)]
    pub command: Option<PlanCommand>,

    /// Secret manager used to encrypt the plan
    #[serde(default)]
    pub secret_manager_ref: Option<String>,

    #[serde(flatten)]
    pub spec: ExecutionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStepParameters {
    pub provisioner_identifier: String,

    #[serde(default)]
    pub configuration: Option<PlanConfiguration>,
}

/// Parameters shared by apply and destroy steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionParameters {
    pub provisioner_identifier: String,

    pub configuration_type: ConfigurationType,

    /// Required for `INLINE`, ignored otherwise
    #[serde(default)]
    pub spec: Option<ExecutionSpec>,
}

/// One provisioning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepSpec {
    Plan(PlanStepParameters),
    Apply(ProvisionParameters),
    Destroy(ProvisionParameters),
}

impl StepSpec {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Plan(_) => StepKind::Plan,
            Self::Apply(_) => StepKind::Apply,
            Self::Destroy(_) => StepKind::Destroy,
        }
    }

    pub fn provisioner_identifier(&self) -> &str {
        match self {
            Self::Plan(p) => &p.provisioner_identifier,
            Self::Apply(p) | Self::Destroy(p) => &p.provisioner_identifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Plan,
    Apply,
    Destroy,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{}", name)
    }
}
