//! Configuration for terrastep.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TERRASTEP_HOME, TERRASTEP_GATEWAY_URL,
//!    TERRASTEP_GATEWAY_TOKEN)
//! 2. Config file (.terrastep/config.yaml)
//! 3. Defaults (~/.terrastep)
//!
//! Config file discovery:
//! - Searches current directory and parents for .terrastep/config.yaml
//! - `paths.home` is relative to the .terrastep/ directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{Connector, StaticFeatureFlags};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
    #[serde(default)]
    pub feature_flags: StaticFeatureFlags,
    /// Connector reference -> connector
    #[serde(default)]
    pub connectors: HashMap<String, Connector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .terrastep/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub default_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to terrastep home (state logs)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub gateway: GatewaySettings,
    pub feature_flags: StaticFeatureFlags,
    pub connectors: HashMap<String, Connector>,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Remote executor base URL; dispatching is impossible without one
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub default_timeout_seconds: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl ResolvedConfig {
    /// Directory holding the snapshot and plan-handoff logs
    pub fn state_dir(&self) -> PathBuf {
        self.home.join("state")
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.default_timeout_seconds)
    }
}

/// Nearest `.terrastep/config.yaml` walking up from the working directory
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(".terrastep").join("config.yaml"))
        .find(|candidate| candidate.is_file())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Anchor a relative `paths.home` at the directory holding the config file
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let joined = base.join(path_str);
    joined.canonicalize().unwrap_or(joined)
}

/// Non-empty environment override
fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".terrastep");

    let config_file = find_config_file();
    let file = config_file
        .as_deref()
        .map(load_config_file)
        .transpose()?;

    let file_home = file
        .as_ref()
        .and_then(|f| f.paths.home.as_deref())
        .zip(config_file.as_deref().and_then(Path::parent))
        .map(|(home, dir)| resolve_path(dir, home));
    let home = env_override("TERRASTEP_HOME")
        .map(PathBuf::from)
        .or(file_home)
        .unwrap_or(default_home);

    let file_gateway = file.as_ref().and_then(|f| f.gateway.as_ref());
    let gateway = GatewaySettings {
        endpoint: env_override("TERRASTEP_GATEWAY_URL")
            .or_else(|| file_gateway.and_then(|g| g.endpoint.clone())),
        token: env_override("TERRASTEP_GATEWAY_TOKEN")
            .or_else(|| file_gateway.and_then(|g| g.token.clone())),
        default_timeout_seconds: file_gateway
            .and_then(|g| g.default_timeout_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
    };

    let (feature_flags, connectors) = file
        .map(|f| (f.feature_flags, f.connectors))
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        config_file,
        gateway,
        feature_flags,
        connectors,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the terrastep home directory
pub fn terrastep_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the state directory ($TERRASTEP_HOME/state)
pub fn state_dir() -> Result<PathBuf> {
    Ok(config()?.state_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FeatureFlag, FeatureFlags};
    use crate::domain::{GitConnectionType, StoreKind};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".terrastep");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state-home
gateway:
  endpoint: http://executor:8080
  default_timeout_seconds: 1200
feature_flags:
  save_terraform_state_json: [acc1]
connectors:
  account.github:
    name: GitHub
    kind: github
    url: https://github.com/acme/
    connection_type: account
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home.as_deref(), Some("./state-home"));

        let gateway = config.gateway.unwrap();
        assert_eq!(gateway.endpoint.as_deref(), Some("http://executor:8080"));
        assert_eq!(gateway.default_timeout_seconds, Some(1200));
        assert!(gateway.token.is_none());

        assert!(config
            .feature_flags
            .is_enabled(FeatureFlag::SaveTerraformStateJson, "acc1"));

        let connector = &config.connectors["account.github"];
        assert_eq!(connector.kind, StoreKind::Github);
        assert_eq!(connector.connection_type, GitConnectionType::Account);
    }

    #[test]
    fn test_state_dir_and_timeout() {
        let config = ResolvedConfig {
            home: PathBuf::from("/test/.terrastep"),
            config_file: None,
            gateway: GatewaySettings::default(),
            feature_flags: StaticFeatureFlags::default(),
            connectors: HashMap::new(),
        };

        assert_eq!(config.state_dir(), PathBuf::from("/test/.terrastep/state"));
        assert_eq!(config.default_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.terrastep");

        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "state"),
            PathBuf::from("/home/user/project/.terrastep/state")
        );
    }
}
