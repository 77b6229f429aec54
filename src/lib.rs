//! terrastep - Provisioning pipeline orchestrator
//!
//! Orchestrates plan / apply / destroy steps of an infrastructure
//! provisioning tool. The tool itself runs on a remote executor; this crate
//! builds the task descriptors, dispatches them through a gateway and
//! reconciles the results into persisted state.
//!
//! # Architecture
//!
//! - A plan step leaves a handoff record scoped to its pipeline execution
//! - A later apply or destroy can inherit that plan instead of its own spec
//! - Every successful apply appends a snapshot; destroy can reuse the
//!   latest one and removes them all on success
//!
//! # Modules
//!
//! - `adapters`: External collaborators (executor gateway, connectors,
//!   state-file pointer, feature flags)
//! - `core`: Resolution, state stores, step controller, orchestrator
//! - `domain`: Data structures (steps, snapshots, tasks, runs)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a pipeline
//! terrastep run network.yaml --account acc --org org --project proj
//!
//! # Preview the task a step would dispatch
//! terrastep task apply.yaml --account acc --org org --project proj
//!
//! # Show the latest apply snapshot
//! terrastep snapshot network --account acc --org org --project proj
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, StepController, StepError};
pub use domain::{PipelineRun, RunState, StepOutcome, StepSpec};
