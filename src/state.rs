use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Persisted sync progress.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub record_count: u64,
    pub last_activity_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// JSON file holding the [`Checkpoint`]. No locking: two concurrent runs can
/// race on it.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means nothing was synced yet. A file that fails to parse
    /// is an error, never a silent reset.
    pub fn load(&self) -> Result<Checkpoint> {
        if !self.path.exists() {
            info!(
                "Checkpoint not found, starting from scratch: {}",
                self.path.display()
            );
            return Ok(Checkpoint::default());
        }

        debug!("Loading checkpoint from: {}", self.path.display());
        let content = fs::read_to_string(&self.path).map_err(|e| SyncError::CheckpointIo {
            path: self.path.clone(),
            source: e,
        })?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|e| SyncError::CorruptCheckpoint {
                path: self.path.clone(),
                source: e,
            })?;

        info!(
            "Loaded checkpoint: record_count={}, last_activity_date={:?}",
            checkpoint.record_count, checkpoint.last_activity_date
        );
        Ok(checkpoint)
    }

    /// Overwrite the checkpoint in full: the temp file is flushed to disk
    /// before it is renamed over the old one.
    pub fn save(&self, record_count: u64, last_activity_date: Option<String>) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            record_count,
            last_activity_date,
            last_synced_at: Some(Utc::now()),
        };
        debug!("Saving checkpoint to: {}", self.path.display());

        let io_err = |e: std::io::Error| SyncError::CheckpointIo {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(&checkpoint).map_err(|e| SyncError::CheckpointIo {
            path: self.path.clone(),
            source: e.into(),
        })?;
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        info!(
            "Saved checkpoint: record_count={}, last_activity_date={:?}",
            checkpoint.record_count, checkpoint.last_activity_date
        );
        Ok(checkpoint)
    }
}
