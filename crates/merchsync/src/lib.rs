//! Merchsync - fault-tolerant product record migration.
//!
//! Reconciles product records in a local SQLite store with product and
//! price entities in a remote commerce platform: validates and transforms
//! each record, idempotently creates the remote entities, writes the
//! mapping back, and checkpoints progress so interrupted runs resume
//! where they left off.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use merchsync::{
//!     connect_and_migrate, AdaptiveRateLimiter, BreakerRegistry, EngineConfig,
//!     MigrationEngine, RemoteSyncService, ReqwestTransport, RetryConfig, SourceStore,
//! };
//!
//! let db = connect_and_migrate("sqlite://products.db?mode=rwc").await?;
//! let transport = ReqwestTransport::new(base_url, api_key, timeout)?;
//! let remote = RemoteSyncService::new(
//!     Arc::new(transport),
//!     AdaptiveRateLimiter::with_defaults(),
//!     Arc::new(BreakerRegistry::default()),
//!     RetryConfig::default(),
//! );
//! let engine = MigrationEngine::new(
//!     SourceStore::new(db),
//!     Arc::new(remote),
//!     EngineConfig::default(),
//! );
//! let report = engine.run(None).await?;
//! ```

pub mod breaker;
pub mod checkpoint;
pub mod db;
pub mod engine;
pub mod entity;
pub mod error;
pub mod limiter;
pub mod migration;
pub mod progress;
pub mod remote;
pub mod retry;
pub mod store;
pub mod transport;
pub mod validate;

pub use breaker::{BreakerRegistry, CircuitState, OpContext};
pub use checkpoint::{CheckpointManager, CheckpointRecord, ErrorEntry, MigrationState};
pub use db::{connect, connect_and_migrate};
pub use engine::{EngineConfig, MigrationEngine, MigrationReport, RecordOutcome};
pub use entity::prelude::*;
pub use error::{Result, Severity, SyncError};
pub use limiter::{rate_limits, AdaptiveRateLimiter};
pub use progress::{MigrationProgress, ProgressCallback};
pub use remote::{RemoteProduct, RemoteSyncService};
pub use retry::{execute_with_retry, AttemptCounter, RetryConfig};
pub use store::{BatchFilter, SourceStore, SyncStrategy, SyncWriteBack};
pub use transport::{HttpTransport, ReqwestTransport};
pub use validate::{ValidatedProduct, Validator, Violation};
