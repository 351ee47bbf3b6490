//! Checkpoint persistence for resumable migration runs.
//!
//! # Atomic writes
//!
//! Saves use the temp-file + rename pattern:
//! 1. Copy the existing checkpoint to `{path}.backup` (best-effort).
//! 2. Write the new record to `{path}.tmp`.
//! 3. Rename `{path}.tmp` over `{path}`.
//!
//! The checkpoint file is therefore never partially written, and a crash
//! mid-save leaves the previous snapshot recoverable from the backup.
//!
//! # Load validation
//!
//! A checkpoint is treated as absent when it fails to parse (the backup is
//! tried first), when its `config_hash` differs from the current run
//! configuration, when its format version is unknown, or when it is older
//! than [`MAX_CHECKPOINT_AGE`]. Resuming from stale or mismatched state is
//! judged worse than restarting.

pub mod state;

pub use state::{CheckpointRecord, ErrorEntry, MigrationState, FORMAT_VERSION};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Checkpoints older than this are discarded on load.
pub const MAX_CHECKPOINT_AGE: Duration = Duration::hours(24);

/// Manages the checkpoint file and its `.backup` sibling.
pub struct CheckpointManager {
    path: PathBuf,
    config_hash: String,
    save_interval: u64,
}

impl CheckpointManager {
    /// `save_interval` is the number of processed records between saves;
    /// zero disables periodic saves (final save still happens).
    pub fn new(path: impl Into<PathBuf>, config_hash: String, save_interval: u64) -> Self {
        Self {
            path: path.into(),
            config_hash,
            save_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        append_extension(&self.path, "backup")
    }

    fn temp_path(&self) -> PathBuf {
        append_extension(&self.path, "tmp")
    }

    /// Modulo check so checkpointing amortizes I/O instead of firing on
    /// every record.
    pub fn should_save(&self, processed: u64) -> bool {
        self.save_interval > 0 && processed > 0 && processed % self.save_interval == 0
    }

    /// Persist a snapshot, backing up the previous file first.
    pub fn save(&self, state: &MigrationState) -> Result<()> {
        let record = CheckpointRecord::new(state.clone(), self.config_hash.clone());
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| SyncError::checkpoint(format!("serialize checkpoint: {e}")))?;

        if self.path.exists() {
            // Single-level rollback; losing the backup is not fatal.
            if let Err(e) = fs::copy(&self.path, self.backup_path()) {
                warn!(error = %e, "failed to back up previous checkpoint");
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SyncError::checkpoint(format!("create checkpoint dir: {e}")))?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, json)
            .map_err(|e| SyncError::checkpoint(format!("write checkpoint temp file: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| SyncError::checkpoint(format!("commit checkpoint: {e}")))?;

        debug!(
            path = %self.path.display(),
            processed = state.processed,
            "saved checkpoint"
        );
        Ok(())
    }

    /// Load the most recent usable snapshot, or `None` to start fresh.
    ///
    /// Falls back to the backup file when the primary is missing or
    /// corrupt. Never returns an error for unusable state; the caller
    /// starts fresh instead.
    pub fn load(&self) -> Option<MigrationState> {
        let record = self
            .load_record(&self.path)
            .or_else(|| self.load_record(&self.backup_path()))?;

        if record.format_version != FORMAT_VERSION {
            warn!(
                found = record.format_version,
                expected = FORMAT_VERSION,
                "checkpoint format version mismatch, starting fresh"
            );
            return None;
        }
        if record.config_hash != self.config_hash {
            warn!("checkpoint config hash mismatch, starting fresh");
            return None;
        }
        if Utc::now() - record.timestamp > MAX_CHECKPOINT_AGE {
            warn!(
                saved_at = %record.timestamp,
                "checkpoint older than 24h, starting fresh"
            );
            return None;
        }
        if !record.state.counters_consistent() {
            warn!("checkpoint counters inconsistent, starting fresh");
            return None;
        }

        debug!(
            processed = record.state.processed,
            saved_at = %record.timestamp,
            "loaded checkpoint"
        );
        Some(record.state)
    }

    fn load_record(&self, path: &Path) -> Option<CheckpointRecord> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read checkpoint");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse checkpoint");
                None
            }
        }
    }

    /// Remove the checkpoint and its backup. Called after a clean run.
    pub fn clear(&self) -> Result<()> {
        for path in [self.path.clone(), self.backup_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(SyncError::checkpoint(format!(
                        "remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Ok(())
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}
