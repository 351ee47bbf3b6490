//! Final run report: per-record outcomes plus aggregate counts.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkpoint::ErrorEntry;
use crate::error::{Result, SyncError};

/// One processed record's outcome. Appended to the engine's results list
/// and persisted verbatim into the report artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub success: bool,
    pub source_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_price_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Underlying remote attempts across all calls for this record.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Result of the post-run verification sampling pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub sampled: usize,
    pub mismatches: Vec<String>,
}

/// Structured summary written after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub duration_ms: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// succeeded / processed, in [0, 1]; 1.0 for an empty run.
    pub success_rate: f64,
    pub paused: bool,
    pub errors: Vec<ErrorEntry>,
    pub outcomes: Vec<RecordOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSummary>,
}

impl MigrationReport {
    /// True when every processed record succeeded and nothing interrupted
    /// the run. Drives the process exit code.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.paused
    }

    /// Serialize the report to pretty JSON at `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::internal(format!("serialize report: {e}")))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SyncError::internal(format!("create report dir: {e}")))?;
        }
        fs::write(path, json)
            .map_err(|e| SyncError::internal(format!("write report {}: {e}", path.display())))?;
        Ok(())
    }
}

pub(super) fn success_rate(succeeded: u64, processed: u64) -> f64 {
    if processed == 0 {
        1.0
    } else {
        succeeded as f64 / processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report() -> MigrationReport {
        MigrationReport {
            generated_at: Utc::now(),
            dry_run: false,
            duration_ms: 1234,
            processed: 3,
            succeeded: 2,
            failed: 1,
            skipped: 0,
            success_rate: success_rate(2, 3),
            paused: false,
            errors: vec![ErrorEntry {
                source_id: Uuid::new_v4(),
                message: "price: amount must be positive".into(),
                occurred_at: Utc::now(),
            }],
            outcomes: vec![RecordOutcome {
                success: true,
                source_id: Uuid::new_v4(),
                remote_product_id: Some("prod_1".into()),
                remote_price_id: Some("price_1".into()),
                error: None,
                attempts: 1,
                elapsed_ms: 40,
            }],
            verification: None,
        }
    }

    #[test]
    fn success_rate_handles_the_empty_run() {
        assert_eq!(success_rate(0, 0), 1.0);
        assert_eq!(success_rate(1, 2), 0.5);
    }

    #[test]
    fn failed_records_make_the_run_unclean() {
        let mut r = report();
        assert!(!r.is_clean());
        r.failed = 0;
        assert!(r.is_clean());
        r.paused = true;
        assert!(!r.is_clean());
    }

    #[test]
    fn write_json_produces_a_parseable_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");
        report().write_json(&path).unwrap();

        let parsed: MigrationReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.processed, 3);
        assert_eq!(parsed.outcomes.len(), 1);
    }
}
