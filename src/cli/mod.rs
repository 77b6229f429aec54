//! Command-line interface for terrastep.
//!
//! Provides commands for running provisioning pipelines, previewing the
//! task a step would dispatch, inspecting apply snapshots and flattening
//! provisioning outputs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{HttpTaskGateway, StaticConnectors, TaskGateway};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    parse_outputs, InheritedStateStore, JsonlStateFiles, JsonlStateStore, Orchestrator,
    PipelineStep, ProvisionPipeline, StepController,
};
use crate::domain::{entity_id, ExecutionContext, RunState};

/// terrastep - Provisioning pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "terrastep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Account/org/project a command runs under
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    #[arg(long, env = "TERRASTEP_ACCOUNT")]
    pub account: String,

    #[arg(long, env = "TERRASTEP_ORG")]
    pub org: String,

    #[arg(long, env = "TERRASTEP_PROJECT")]
    pub project: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a provisioning pipeline
    Run {
        /// Pipeline definition (YAML)
        pipeline: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Print the task a step would dispatch, without dispatching it
    Task {
        /// Step definition (YAML)
        step: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Pipeline execution to resolve plan handoffs from
        #[arg(long)]
        execution_id: Option<String>,
    },

    /// Show the latest apply snapshot of a provisioner
    Snapshot {
        /// Provisioner identifier
        provisioner: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Show every snapshot instead of only the latest
        #[arg(short, long)]
        all: bool,
    },

    /// Flatten a raw provisioning outputs JSON file
    Outputs {
        /// Outputs file
        file: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { pipeline, scope } => run_pipeline(pipeline, scope).await,
            Commands::Task {
                step,
                scope,
                execution_id,
            } => preview_task(step, scope, execution_id).await,
            Commands::Snapshot {
                provisioner,
                scope,
                all,
            } => show_snapshot(provisioner, scope, all).await,
            Commands::Outputs { file } => show_outputs(file),
            Commands::Config => show_config(),
        }
    }
}

fn open_state_store(cfg: &ResolvedConfig) -> Result<Arc<JsonlStateStore>> {
    let dir = cfg.state_dir();
    let store = JsonlStateStore::open(&dir)
        .with_context(|| format!("Failed to open state store: {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn open_state_files(cfg: &ResolvedConfig) -> Result<Arc<JsonlStateFiles>> {
    let dir = cfg.state_dir();
    let files = JsonlStateFiles::open(&dir)
        .with_context(|| format!("Failed to open state-file pointers: {}", dir.display()))?;
    Ok(Arc::new(files))
}

fn build_controller(cfg: &ResolvedConfig, gateway: Arc<dyn TaskGateway>) -> Result<StepController> {
    Ok(StepController::new(
        open_state_store(cfg)?,
        gateway,
        Arc::new(StaticConnectors::from_map(cfg.connectors.clone())),
        open_state_files(cfg)?,
        Arc::new(cfg.feature_flags.clone()),
    ))
}

async fn run_pipeline(path: PathBuf, scope: ScopeArgs) -> Result<()> {
    let cfg = config::config()?;
    let pipeline = ProvisionPipeline::from_file(&path)?;

    let endpoint = cfg
        .gateway
        .endpoint
        .clone()
        .context("No gateway endpoint configured (set TERRASTEP_GATEWAY_URL)")?;
    let gateway = Arc::new(HttpTaskGateway::new(endpoint, cfg.gateway.token.clone()));

    let orchestrator = Orchestrator::new(build_controller(cfg, gateway)?, cfg.default_timeout());
    let run = orchestrator
        .run_pipeline(&pipeline, &scope.account, &scope.org, &scope.project)
        .await?;

    for (step, outcome) in &run.step_outcomes {
        println!("{}: {:?}", step, outcome.status);
        if let Some(outputs) = outcome.provisioning_outputs() {
            for (name, value) in outputs {
                println!("  {} = {}", name, value);
            }
        }
    }

    match &run.state {
        RunState::Completed => {
            eprintln!("\n[Execution {} completed successfully]", run.id);
        }
        RunState::Stopped { step, reason } => {
            eprintln!("\n[Execution {} stopped at '{}': {}]", run.id, step, reason);
        }
        RunState::Running => {
            eprintln!("\n[Execution {} in state: {:?}]", run.id, run.state);
        }
    }

    Ok(())
}

async fn preview_task(path: PathBuf, scope: ScopeArgs, execution_id: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let step = PipelineStep::from_file(&path)?;

    // Never dispatched
    let gateway = Arc::new(HttpTaskGateway::new(
        cfg.gateway.endpoint.clone().unwrap_or_default(),
        None,
    ));
    let controller = build_controller(cfg, gateway)?;

    let ctx = ExecutionContext::new(
        scope.account,
        scope.org,
        scope.project,
        execution_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
    );
    let task = controller
        .obtain_task(&ctx, &step.spec, step.timeout(cfg.default_timeout()))
        .await?;

    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

async fn show_snapshot(provisioner: String, scope: ScopeArgs, all: bool) -> Result<()> {
    let cfg = config::config()?;
    let store = open_state_store(cfg)?;
    let entity = entity_id(&scope.account, &scope.org, &scope.project, &provisioner);

    if all {
        let snapshots = store.apply_snapshots(&entity).await?;
        if snapshots.is_empty() {
            println!("No snapshots for {}", entity);
            return Ok(());
        }
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        let snapshot = store.latest_apply_snapshot(&entity).await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}

fn show_outputs(path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read outputs file: {}", path.display()))?;

    println!("{}", serde_json::to_string_pretty(&parse_outputs(&raw))?);
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("terrastep configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:  {}", cfg.home.display());
    println!("  State: {}", cfg.state_dir().display());
    println!();
    println!("Gateway:");
    println!(
        "  Endpoint:        {}",
        cfg.gateway.endpoint.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Token:           {}",
        if cfg.gateway.token.is_some() { "(set)" } else { "(not set)" }
    );
    println!("  Default timeout: {}s", cfg.gateway.default_timeout_seconds);
    println!();
    println!("Connectors:");
    if cfg.connectors.is_empty() {
        println!("  (none)");
    } else {
        for (reference, connector) in &cfg.connectors {
            println!(
                "  {}: {:?} {} ({:?})",
                reference, connector.kind, connector.url, connector.connection_type
            );
        }
    }

    Ok(())
}
