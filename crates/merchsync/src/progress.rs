//! Progress reporting types for migration runs.
//!
//! The engine emits these events as it moves through its phases so a CLI
//! (or any other frontend) can render progress without the engine knowing
//! how it is displayed.

use uuid::Uuid;

/// Progress events emitted during a migration run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MigrationProgress {
    /// Preflight checks passed; the run is about to start.
    Starting {
        /// Total pending records the run will cover.
        total_records: u64,
        /// Number of batches this implies.
        total_batches: u64,
        /// Whether this is a dry run.
        dry_run: bool,
    },

    /// A valid checkpoint was loaded; iteration resumes mid-run.
    Resuming {
        /// Records already processed by the previous run.
        processed: u64,
        /// Batch index iteration resumes at.
        batch_index: u64,
    },

    /// Starting one batch.
    BatchStarted {
        /// Batch index (0-based).
        index: u64,
        /// Total batches.
        total: u64,
        /// Records fetched for this batch.
        count: usize,
    },

    /// One record finished, successfully or not.
    RecordProcessed {
        source_id: Uuid,
        success: bool,
        /// Underlying attempts across all remote calls for this record.
        attempts: u32,
    },

    /// A record was skipped by validation.
    RecordSkipped {
        source_id: Uuid,
        reason: String,
    },

    /// One batch finished.
    BatchComplete {
        index: u64,
        succeeded: u64,
        failed: u64,
        skipped: u64,
    },

    /// Progress was checkpointed to disk.
    CheckpointSaved {
        processed: u64,
    },

    /// A pause signal was observed; the run stops at this batch boundary.
    Pausing,

    /// Verifying a sample of successful records against the remote platform.
    Verifying {
        sample_size: usize,
    },

    /// A sampled identifier no longer resolves remotely.
    VerificationMismatch {
        source_id: Uuid,
        remote_product_id: String,
    },

    /// Warning message (non-fatal).
    Warning {
        message: String,
    },

    /// The run is over and the report is final.
    Complete {
        processed: u64,
        succeeded: u64,
        failed: u64,
        skipped: u64,
    },
}

/// Callback for progress updates during a migration run.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MigrationProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
