//! Migration orchestration.
//!
//! [`MigrationEngine::run`] drives the whole pipeline: preflight checks,
//! checkpoint resume, batch iteration with bounded concurrency, optional
//! verification sampling, and the final report. Per-record failures are
//! recorded and the run continues; run-severity errors (authentication,
//! source store schema problems) abort the run after a final checkpoint
//! save.
//!
//! An external pause flag is observed at batch boundaries only: in-flight
//! record work always completes, since a partial remote write cannot be
//! rolled back.

pub mod report;

pub use report::{MigrationReport, RecordOutcome, VerificationSummary};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointManager, ErrorEntry, MigrationState};
use crate::entity::prelude::ProductModel;
use crate::entity::sync_status::SyncStatus;
use crate::error::{Result, Severity, SyncError};
use crate::progress::{emit, MigrationProgress, ProgressCallback};
use crate::remote::RemoteSyncService;
use crate::retry::AttemptCounter;
use crate::store::{BatchFilter, SourceStore, SyncWriteBack};
use crate::validate::{violations_to_error, Validator};

/// Cap on how many successful records the verification pass re-queries.
const VERIFY_SAMPLE_CAP: usize = 10;
/// How many per-record errors are echoed into the run-summary log.
const LOGGED_ERROR_LIMIT: usize = 10;

/// Engine configuration for one migration run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub batch_size: u64,
    /// Bounded concurrency for per-record pipelines within a batch.
    pub concurrency: usize,
    /// Records between periodic checkpoint saves; zero disables them.
    pub checkpoint_interval: u64,
    /// Smoothing delay between batches, on top of the rate limiter.
    pub inter_batch_delay: Duration,
    /// Verify every k-th successful record after the batch loop; zero
    /// disables verification. The sample is capped at ten records.
    pub verify_sample_every: usize,
    pub dry_run: bool,
    /// Attempt to resume from a checkpoint.
    pub resume: bool,
    /// Master switch for checkpointing; off means no reads or writes.
    pub use_checkpoint: bool,
    pub skip_validation: bool,
    pub filter: BatchFilter,
    pub checkpoint_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 5,
            checkpoint_interval: 10,
            inter_batch_delay: Duration::from_millis(500),
            verify_sample_every: 10,
            dry_run: false,
            resume: true,
            use_checkpoint: true,
            skip_validation: false,
            filter: BatchFilter::default(),
            checkpoint_path: PathBuf::from("merchsync-checkpoint.json"),
            report_path: None,
        }
    }
}

impl EngineConfig {
    /// Hash of the settings that affect resume math. A checkpoint written
    /// under a different hash cannot be trusted to imply the same batch
    /// offsets, so it is discarded on load.
    #[must_use]
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.batch_size.to_le_bytes());
        hasher.update([self.skip_validation as u8, self.dry_run as u8]);
        hasher.update(format!("{:?}", self.filter.strategy).as_bytes());
        hasher.update([self.filter.skip_synced as u8]);
        for id in &self.filter.ids {
            hasher.update(id.as_bytes());
        }
        if let Some(since) = self.filter.updated_since {
            hasher.update(since.timestamp().to_le_bytes());
        }
        if let Some(before) = self.filter.updated_before {
            hasher.update(before.timestamp().to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Per-batch tallies, folded into [`MigrationState`] as each batch ends.
#[derive(Default)]
struct BatchTally {
    succeeded: u64,
    failed: u64,
    skipped: u64,
    /// First run-severity error seen in this batch, if any.
    run_fatal: Option<SyncError>,
}

/// Top-level migration orchestrator.
pub struct MigrationEngine {
    store: SourceStore,
    remote: Arc<RemoteSyncService>,
    checkpoints: CheckpointManager,
    config: EngineConfig,
    pause: Arc<AtomicBool>,
}

impl MigrationEngine {
    pub fn new(store: SourceStore, remote: Arc<RemoteSyncService>, config: EngineConfig) -> Self {
        let checkpoints = CheckpointManager::new(
            config.checkpoint_path.clone(),
            config.config_hash(),
            config.checkpoint_interval,
        );
        Self {
            store,
            remote,
            checkpoints,
            config,
            pause: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared pause flag. Setting it stops the run at the next batch
    /// boundary after a final checkpoint save.
    #[must_use]
    pub fn pause_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pause)
    }

    /// Execute the full migration state machine.
    ///
    /// Returns the final report on completion or pause. Returns an error
    /// only for run-fatal conditions: failed preflight, authentication
    /// failure, or a critical source store error.
    #[tracing::instrument(skip_all, fields(dry_run = self.config.dry_run))]
    pub async fn run(&self, on_progress: Option<&ProgressCallback>) -> Result<MigrationReport> {
        let run_started = Instant::now();
        // Checkpoints during a dry run would poison resume state for the
        // next real run.
        let use_checkpoint = self.config.use_checkpoint && !self.config.dry_run;

        // Preflight: both boundaries must be reachable before any work.
        let total_records = self.store.count_pending(&self.config.filter).await?;
        self.remote.ping().await?;

        let batch_size = self.config.batch_size.max(1);
        let total_batches = total_records.div_ceil(batch_size);

        let mut state = None;
        if use_checkpoint && self.config.resume {
            state = self.checkpoints.load();
        }
        let resumed = state.is_some();
        let mut state = state.unwrap_or_else(|| MigrationState::new(Utc::now()));
        state.is_running = true;
        state.is_paused = false;

        let start_batch = state.processed / batch_size;
        emit(
            on_progress,
            MigrationProgress::Starting {
                total_records,
                total_batches,
                dry_run: self.config.dry_run,
            },
        );
        if resumed {
            info!(
                processed = state.processed,
                batch_index = start_batch,
                "resuming from checkpoint"
            );
            emit(
                on_progress,
                MigrationProgress::Resuming {
                    processed: state.processed,
                    batch_index: start_batch,
                },
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut outcomes: Vec<RecordOutcome> = Vec::new();
        let mut paused = false;

        for index in start_batch..total_batches {
            if self.pause.load(Ordering::SeqCst) {
                emit(on_progress, MigrationProgress::Pausing);
                state.is_paused = true;
                paused = true;
                break;
            }

            // The page offset counts handled rows still matching the filter.
            // With skip_synced, successful write-backs remove rows from the
            // filtered set, so only failures (which stay unsynced and sort
            // before anything unprocessed) keep their slots.
            let offset = if self.config.filter.skip_synced && !self.config.dry_run {
                state.failed
            } else {
                state.processed
            };
            let records = self
                .store
                .fetch_batch(offset, batch_size, &self.config.filter)
                .await?;
            if records.is_empty() {
                break;
            }
            emit(
                on_progress,
                MigrationProgress::BatchStarted {
                    index,
                    total: total_batches,
                    count: records.len(),
                },
            );

            let mut tally = self
                .process_batch(records, &semaphore, &mut state, &mut outcomes, on_progress)
                .await;

            emit(
                on_progress,
                MigrationProgress::BatchComplete {
                    index,
                    succeeded: tally.succeeded,
                    failed: tally.failed,
                    skipped: tally.skipped,
                },
            );
            debug_assert!(state.counters_consistent());

            if use_checkpoint && self.checkpoints.should_save(state.processed) {
                self.save_checkpoint(&state, on_progress);
            }

            if let Some(fatal) = tally.run_fatal.take() {
                if use_checkpoint {
                    self.save_checkpoint(&state, on_progress);
                }
                return Err(fatal);
            }

            if index + 1 < total_batches && !self.config.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        if paused && use_checkpoint {
            self.save_checkpoint(&state, on_progress);
        }
        state.is_running = false;

        let verification = if !paused {
            self.verify_sample(&outcomes, on_progress).await
        } else {
            None
        };

        let report = MigrationReport {
            generated_at: Utc::now(),
            dry_run: self.config.dry_run,
            duration_ms: run_started.elapsed().as_millis() as u64,
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            skipped: state.skipped,
            success_rate: report::success_rate(state.succeeded, state.processed),
            paused,
            errors: state.errors.clone(),
            outcomes,
            verification,
        };

        if let Some(path) = &self.config.report_path {
            if let Err(e) = report.write_json(path) {
                warn!(error = %e, "failed to write report artifact");
            }
        }

        if report.is_clean() && use_checkpoint {
            if let Err(e) = self.checkpoints.clear() {
                warn!(error = %e, "failed to clear checkpoint after clean run");
            }
        }

        for entry in state.errors.iter().take(LOGGED_ERROR_LIMIT) {
            warn!(source_id = %entry.source_id, "record failed: {}", entry.message);
        }
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            paused = report.paused,
            "migration run finished"
        );
        emit(
            on_progress,
            MigrationProgress::Complete {
                processed: report.processed,
                succeeded: report.succeeded,
                failed: report.failed,
                skipped: report.skipped,
            },
        );

        Ok(report)
    }

    /// Validate one batch, then push the valid records through bounded
    /// concurrent pipelines.
    async fn process_batch(
        &self,
        records: Vec<ProductModel>,
        semaphore: &Arc<Semaphore>,
        state: &mut MigrationState,
        outcomes: &mut Vec<RecordOutcome>,
        on_progress: Option<&ProgressCallback>,
    ) -> BatchTally {
        let mut tally = BatchTally::default();

        // Rows already carrying remote identifiers are done; skip them
        // without touching the network.
        let (already_synced, pending): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| {
            r.sync_status == SyncStatus::Synced
                && r.remote_product_id.is_some()
                && r.remote_price_id.is_some()
        });
        for record in already_synced {
            state.processed += 1;
            state.skipped += 1;
            tally.skipped += 1;
            outcomes.push(RecordOutcome {
                success: true,
                source_id: record.id,
                remote_product_id: record.remote_product_id.clone(),
                remote_price_id: record.remote_price_id.clone(),
                error: None,
                attempts: 0,
                elapsed_ms: 0,
            });
            emit(
                on_progress,
                MigrationProgress::RecordSkipped {
                    source_id: record.id,
                    reason: "already synced".to_string(),
                },
            );
        }

        let validator = if self.config.skip_validation {
            Validator::lenient()
        } else {
            Validator::new()
        };
        let batch = validator.validate_batch(pending);

        for warning in batch.warnings {
            emit(on_progress, MigrationProgress::Warning { message: warning });
        }

        // Unprocessable records are failures, not blockers: mark them in
        // the store and keep the batch moving.
        for (record, violations) in batch.invalid {
            let err = violations_to_error(&violations);
            let message = err.to_string();
            if !self.config.dry_run {
                if let Err(e) = self.store.mark_failed(record.id, &message).await {
                    warn!(source_id = %record.id, error = %e, "failed to mark record failed");
                }
            }
            state.processed += 1;
            state.failed += 1;
            tally.failed += 1;
            state.errors.push(ErrorEntry {
                source_id: record.id,
                message: message.clone(),
                occurred_at: Utc::now(),
            });
            outcomes.push(RecordOutcome {
                success: false,
                source_id: record.id,
                remote_product_id: None,
                remote_price_id: None,
                error: Some(message),
                attempts: 0,
                elapsed_ms: 0,
            });
            emit(
                on_progress,
                MigrationProgress::RecordProcessed {
                    source_id: record.id,
                    success: false,
                    attempts: 0,
                },
            );
        }

        let mut handles = Vec::with_capacity(batch.valid.len());
        for (record, product) in batch.valid {
            let semaphore = Arc::clone(semaphore);
            let remote = Arc::clone(&self.remote);
            let store = self.store.clone();
            let dry_run = self.config.dry_run;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = SyncError::internal("semaphore closed unexpectedly");
                        return failed_outcome(record.id, &err, 0, 0);
                    }
                };
                process_record(record, product, remote, store, dry_run).await
            }));
        }

        for handle in handles {
            let (outcome, error) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let err = SyncError::internal(format!("record task panicked: {e}"));
                    // The panicked task's source id is lost with the task.
                    failed_outcome(uuid::Uuid::nil(), &err, 0, 0)
                }
            };

            state.processed += 1;
            if outcome.success {
                state.succeeded += 1;
                tally.succeeded += 1;
                // Only fully committed records may advance the checkpoint
                // watermark, and all joins complete before any save.
                state.last_processed_id = match state.last_processed_id {
                    Some(prev) if prev >= outcome.source_id => Some(prev),
                    _ => Some(outcome.source_id),
                };
            } else {
                state.failed += 1;
                tally.failed += 1;
                state.errors.push(ErrorEntry {
                    source_id: outcome.source_id,
                    message: outcome.error.clone().unwrap_or_default(),
                    occurred_at: Utc::now(),
                });
                if let Some(err) = error {
                    if err.severity() == Severity::Run && tally.run_fatal.is_none() {
                        tally.run_fatal = Some(err);
                    }
                }
            }
            emit(
                on_progress,
                MigrationProgress::RecordProcessed {
                    source_id: outcome.source_id,
                    success: outcome.success,
                    attempts: outcome.attempts,
                },
            );
            outcomes.push(outcome);
        }

        tally
    }

    fn save_checkpoint(&self, state: &MigrationState, on_progress: Option<&ProgressCallback>) {
        // Checkpoint I/O failure degrades resumability but never kills a
        // run that is otherwise making progress.
        match self.checkpoints.save(state) {
            Ok(()) => emit(
                on_progress,
                MigrationProgress::CheckpointSaved {
                    processed: state.processed,
                },
            ),
            Err(e) => warn!(error = %e, "checkpoint save failed; continuing without it"),
        }
    }

    /// Re-query a sample of successful records to confirm the remote
    /// identifiers still resolve. Mismatches are warnings, never fatal.
    async fn verify_sample(
        &self,
        outcomes: &[RecordOutcome],
        on_progress: Option<&ProgressCallback>,
    ) -> Option<VerificationSummary> {
        if self.config.verify_sample_every == 0 || self.config.dry_run {
            return None;
        }

        let sample: Vec<&RecordOutcome> = outcomes
            .iter()
            .filter(|o| o.success && o.attempts > 0)
            .step_by(self.config.verify_sample_every)
            .take(VERIFY_SAMPLE_CAP)
            .collect();
        if sample.is_empty() {
            return None;
        }

        emit(
            on_progress,
            MigrationProgress::Verifying {
                sample_size: sample.len(),
            },
        );

        let mut summary = VerificationSummary {
            sampled: sample.len(),
            mismatches: Vec::new(),
        };
        for outcome in sample {
            let Some(remote_product_id) = &outcome.remote_product_id else {
                continue;
            };
            match self.remote.verify_product(remote_product_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        source_id = %outcome.source_id,
                        remote_product_id,
                        "verification mismatch: remote product no longer resolves"
                    );
                    summary.mismatches.push(remote_product_id.clone());
                    emit(
                        on_progress,
                        MigrationProgress::VerificationMismatch {
                            source_id: outcome.source_id,
                            remote_product_id: remote_product_id.clone(),
                        },
                    );
                }
                Err(e) => warn!(
                    remote_product_id,
                    error = %e,
                    "verification query failed"
                ),
            }
        }
        Some(summary)
    }
}


/// One record's pipeline: find-or-create the product, then its price,
/// then write the mapping back to the source store.
async fn process_record(
    record: ProductModel,
    product: crate::validate::ValidatedProduct,
    remote: Arc<RemoteSyncService>,
    store: SourceStore,
    dry_run: bool,
) -> (RecordOutcome, Option<SyncError>) {
    let started = Instant::now();
    let attempts = AttemptCounter::new();

    let result = async {
        let (remote_product, _created) = remote
            .find_or_create_product(&product, Some(&attempts))
            .await?;
        let price_id = remote
            .find_or_create_price(&remote_product.id, &product, Some(&attempts))
            .await?;
        if !dry_run {
            store
                .write_sync_result(
                    record.id,
                    &SyncWriteBack {
                        remote_product_id: remote_product.id.clone(),
                        remote_price_id: price_id.clone(),
                        status: SyncStatus::Synced,
                        timestamp: Utc::now(),
                    },
                )
                .await?;
        }
        Ok::<_, SyncError>((remote_product.id, price_id))
    }
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok((remote_product_id, remote_price_id)) => (
            RecordOutcome {
                success: true,
                source_id: record.id,
                remote_product_id: Some(remote_product_id),
                remote_price_id: Some(remote_price_id),
                error: None,
                attempts: attempts.get().max(1),
                elapsed_ms,
            },
            None,
        ),
        Err(err) => {
            if !dry_run && err.severity() != Severity::Run {
                if let Err(e) = store.mark_failed(record.id, &err.to_string()).await {
                    warn!(source_id = %record.id, error = %e, "failed to mark record failed");
                }
            }
            failed_outcome(record.id, &err, attempts.get(), elapsed_ms)
        }
    }
}

fn failed_outcome(
    source_id: uuid::Uuid,
    err: &SyncError,
    attempts: u32,
    elapsed_ms: u64,
) -> (RecordOutcome, Option<SyncError>) {
    (
        RecordOutcome {
            success: false,
            source_id,
            remote_product_id: None,
            remote_price_id: None,
            error: Some(err.to_string()),
            attempts,
            elapsed_ms,
        },
        Some(err.clone()),
    )
}
