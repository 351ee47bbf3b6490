//! Progress reporting for migration runs.

use merchsync::progress::{MigrationProgress, ProgressCallback};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    /// Wrap this reporter in the callback type the engine accepts.
    pub fn into_callback(self) -> ProgressCallback {
        Box::new(move |event| self.handle(event))
    }

    pub fn handle(&self, event: MigrationProgress) {
        match event {
            MigrationProgress::Starting {
                total_records,
                total_batches,
                dry_run,
            } => {
                tracing::info!(total_records, total_batches, dry_run, "Starting migration");
            }

            MigrationProgress::Resuming {
                processed,
                batch_index,
            } => {
                tracing::info!(processed, batch_index, "Resuming from checkpoint");
            }

            MigrationProgress::BatchStarted {
                index,
                total,
                count,
            } => {
                tracing::info!(batch = index + 1, total, count, "Processing batch");
            }

            MigrationProgress::RecordProcessed {
                source_id,
                success,
                attempts,
            } => {
                if success {
                    tracing::debug!(source_id = %source_id, attempts, "Record migrated");
                } else {
                    tracing::warn!(source_id = %source_id, attempts, "Record failed");
                }
            }

            MigrationProgress::RecordSkipped { source_id, reason } => {
                tracing::debug!(source_id = %source_id, reason = %reason, "Record skipped");
            }

            MigrationProgress::BatchComplete {
                index,
                succeeded,
                failed,
                skipped,
            } => {
                tracing::info!(batch = index + 1, succeeded, failed, skipped, "Batch complete");
            }

            MigrationProgress::CheckpointSaved { processed } => {
                tracing::debug!(processed, "Checkpoint saved");
            }

            MigrationProgress::Pausing => {
                tracing::info!("Pausing at batch boundary");
            }

            MigrationProgress::Verifying { sample_size } => {
                tracing::info!(sample_size, "Verifying sampled records");
            }

            MigrationProgress::VerificationMismatch {
                source_id,
                remote_product_id,
            } => {
                tracing::warn!(
                    source_id = %source_id,
                    remote_product_id = %remote_product_id,
                    "Verification mismatch"
                );
            }

            MigrationProgress::Warning { message } => {
                tracing::warn!("{message}");
            }

            MigrationProgress::Complete {
                processed,
                succeeded,
                failed,
                skipped,
            } => {
                tracing::info!(processed, succeeded, failed, skipped, "Migration complete");
            }

            _ => {}
        }
    }
}
