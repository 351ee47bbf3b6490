//! Serializable migration progress state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Checkpoint file format version. Bump on incompatible changes; records
/// with a different version are treated as absent.
pub const FORMAT_VERSION: u32 = 1;

/// One recorded per-record failure, carried through checkpoints into the
/// final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub source_id: Uuid,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Mutable progress counters for one migration run. Owned exclusively by
/// the engine; everything else sees snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_processed_id: Option<Uuid>,
    pub errors: Vec<ErrorEntry>,
    pub started_at: DateTime<Utc>,
    pub is_running: bool,
    pub is_paused: bool,
}

impl MigrationState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            last_processed_id: None,
            errors: Vec::new(),
            started_at,
            is_running: false,
            is_paused: false,
        }
    }

    /// Counter invariant: every processed record is exactly one of
    /// succeeded, failed, or skipped. Checked at checkpoint boundaries.
    pub fn counters_consistent(&self) -> bool {
        self.processed == self.succeeded + self.failed + self.skipped
    }
}

/// Immutable on-disk snapshot: the state plus enough context to decide
/// whether it is safe to resume from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub timestamp: DateTime<Utc>,
    pub format_version: u32,
    pub state: MigrationState,
    /// Hash of the run configuration that produced this checkpoint; a
    /// mismatch means the resume math no longer holds.
    pub config_hash: String,
}

impl CheckpointRecord {
    pub fn new(state: MigrationState, config_hash: String) -> Self {
        Self {
            timestamp: Utc::now(),
            format_version: FORMAT_VERSION,
            state,
            config_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_consistent_holds_for_fresh_state() {
        let state = MigrationState::new(Utc::now());
        assert!(state.counters_consistent());
    }

    #[test]
    fn counters_consistent_detects_drift() {
        let mut state = MigrationState::new(Utc::now());
        state.processed = 3;
        state.succeeded = 1;
        state.failed = 1;
        assert!(!state.counters_consistent());
        state.skipped = 1;
        assert!(state.counters_consistent());
    }

    #[test]
    fn record_serializes_with_format_version() {
        let record = CheckpointRecord::new(MigrationState::new(Utc::now()), "abc123".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["format_version"], FORMAT_VERSION);
        assert_eq!(json["config_hash"], "abc123");
    }
}
