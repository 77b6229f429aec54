//! File-backed state using append-only JSONL logs.
//!
//! Snapshots, plan handoffs and state-file pointers each live in their own
//! log under the state directory. Deletion appends a `cleared` record;
//! current state is always derived by replaying the log from the start.

use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::adapters::StateFileService;
use crate::domain::{inherit_output_name, InheritOutput, TerraformConfig};

use super::state_store::{latest_snapshot, InheritedStateStore, StoreError};

const SNAPSHOTS_FILE: &str = "snapshots.jsonl";
const INHERIT_OUTPUTS_FILE: &str = "inherit_outputs.jsonl";
const STATE_FILES_FILE: &str = "state_files.jsonl";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum SnapshotRecord {
    Saved {
        snapshot: TerraformConfig,
    },
    Cleared {
        entity_id: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct InheritOutputRecord {
    pipeline_execution_id: String,
    name: String,
    output: InheritOutput,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFilePointer {
    entity_id: String,
    state_file_id: String,
    at: DateTime<Utc>,
}

/// JSONL-backed `InheritedStateStore`
pub struct JsonlStateStore {
    snapshots_path: PathBuf,
    inherit_outputs_path: PathBuf,
}

impl JsonlStateStore {
    /// Open (or create) a store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            snapshots_path: dir.join(SNAPSHOTS_FILE),
            inherit_outputs_path: dir.join(INHERIT_OUTPUTS_FILE),
        })
    }

    pub fn snapshots_path(&self) -> &Path {
        &self.snapshots_path
    }

    /// Replay the snapshot log, applying `cleared` records as they appear
    async fn replay_snapshots(&self) -> Result<Vec<TerraformConfig>, StoreError> {
        let mut snapshots: Vec<TerraformConfig> = Vec::new();

        for record in replay::<SnapshotRecord>(&self.snapshots_path).await? {
            match record {
                SnapshotRecord::Saved { snapshot } => snapshots.push(snapshot),
                SnapshotRecord::Cleared { entity_id, .. } => {
                    snapshots.retain(|s| s.entity_id != entity_id)
                }
            }
        }

        Ok(snapshots)
    }
}

/// Append one JSON line under an exclusive lock
fn append<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    file.lock_exclusive()?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)?;
    file.flush()?;

    // Lock is released when file is dropped
    Ok(())
}

/// Count the live rows of `entity_id` and append its `cleared` record.
///
/// The exclusive lock is held across both, so an apply appended
/// concurrently lands either before the count or after the record.
fn clear_entity(path: &Path, entity_id: &str) -> Result<usize, StoreError> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    file.lock_exclusive()?;

    let mut removed = 0usize;
    for line in std::io::BufReader::new(&file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SnapshotRecord>(&line)? {
            SnapshotRecord::Saved { snapshot } if snapshot.entity_id == entity_id => removed += 1,
            SnapshotRecord::Cleared { entity_id: cleared, .. } if cleared == entity_id => {
                removed = 0
            }
            _ => {}
        }
    }

    let record = SnapshotRecord::Cleared {
        entity_id: entity_id.to_string(),
        at: Utc::now(),
    };
    writeln!(file, "{}", serde_json::to_string(&record)?)?;
    file.flush()?;

    Ok(removed)
}

async fn replay<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}

#[async_trait]
impl InheritedStateStore for JsonlStateStore {
    async fn save_apply_snapshot(&self, snapshot: TerraformConfig) -> Result<(), StoreError> {
        debug!(entity_id = %snapshot.entity_id, "Appending apply snapshot");
        append(&self.snapshots_path, &SnapshotRecord::Saved { snapshot })
    }

    async fn latest_apply_snapshot(&self, entity_id: &str) -> Result<TerraformConfig, StoreError> {
        latest_snapshot(entity_id, self.replay_snapshots().await?)
    }

    async fn apply_snapshots(&self, entity_id: &str) -> Result<Vec<TerraformConfig>, StoreError> {
        Ok(self
            .replay_snapshots()
            .await?
            .into_iter()
            .filter(|s| s.entity_id == entity_id)
            .collect())
    }

    async fn delete_all_snapshots(&self, entity_id: &str) -> Result<usize, StoreError> {
        let removed = clear_entity(&self.snapshots_path, entity_id)?;
        debug!(entity_id = %entity_id, removed, "Cleared apply snapshots");
        Ok(removed)
    }

    async fn save_inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
        output: InheritOutput,
    ) -> Result<(), StoreError> {
        append(
            &self.inherit_outputs_path,
            &InheritOutputRecord {
                pipeline_execution_id: pipeline_execution_id.to_string(),
                name: inherit_output_name(entity_id),
                output,
            },
        )
    }

    async fn inherit_output(
        &self,
        entity_id: &str,
        pipeline_execution_id: &str,
    ) -> Result<InheritOutput, StoreError> {
        let name = inherit_output_name(entity_id);

        replay::<InheritOutputRecord>(&self.inherit_outputs_path)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.pipeline_execution_id == pipeline_execution_id && r.name == name)
            .map(|r| r.output)
            .ok_or_else(|| StoreError::InheritOutputNotFound {
                entity_id: entity_id.to_string(),
                pipeline_execution_id: pipeline_execution_id.to_string(),
            })
    }
}

/// JSONL-backed `StateFileService`; the last pointer written for an
/// entity is current
pub struct JsonlStateFiles {
    path: PathBuf,
}

impl JsonlStateFiles {
    /// Open (or create) the pointer log in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(STATE_FILES_FILE),
        })
    }
}

#[async_trait]
impl StateFileService for JsonlStateFiles {
    async fn latest_file_id(&self, entity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(replay::<StateFilePointer>(&self.path)
            .await?
            .into_iter()
            .rev()
            .find(|p| p.entity_id == entity_id)
            .map(|p| p.state_file_id))
    }

    async fn update_parent_entity(
        &self,
        entity_id: &str,
        state_file_id: &str,
    ) -> Result<(), StoreError> {
        debug!(entity_id = %entity_id, state_file_id = %state_file_id, "Advancing state-file pointer");
        append(
            &self.path,
            &StateFilePointer {
                entity_id: entity_id.to_string(),
                state_file_id: state_file_id.to_string(),
                at: Utc::now(),
            },
        )
    }
}
