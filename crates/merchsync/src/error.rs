//! Error taxonomy for migration operations.
//!
//! Every failure crossing a component boundary is classified exactly once
//! into a [`SyncError`] variant when it is caught. Downstream code asks
//! `is_retryable()` / `severity()` instead of re-inspecting messages.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// How far a failure reaches.
///
/// - `Record`: fatal to one record, the batch continues.
/// - `Batch`: aborts the current batch, the run may continue.
/// - `Run`: fatal to the whole migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Record,
    Batch,
    Run,
}

/// Errors that can occur while migrating records to the remote platform.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Record failed validation. Never retried.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Transient network or 5xx failure. Retryable.
    #[error("network error: {message}")]
    TransientNetwork { message: String },

    /// Remote platform asked us to back off (HTTP 429).
    #[error("rate limited by remote platform{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Authentication rejected. Fatal to the whole run.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Remote entity does not exist. Treated as a create trigger, not a failure.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Duplicate remote entity. Treated as success via the idempotent lookup path.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Source store schema/table missing or connection dead. Fatal to the run.
    #[error("source store error: {message}")]
    CriticalStore { message: String },

    /// Checkpoint I/O failed. Logged, never fatal; the run continues unpersisted.
    #[error("checkpoint error: {message}")]
    Checkpoint { message: String },

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn reset_hint(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(", resets at {at}"),
        None => String::new(),
    }
}

impl SyncError {
    #[inline]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    #[inline]
    pub fn store(message: impl Into<String>) -> Self {
        Self::CriticalStore {
            message: message.into(),
        }
    }

    #[inline]
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the retry handler may attempt this operation again.
    ///
    /// Validation, authentication, and malformed-request errors are never
    /// retried; retrying cannot change the outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::RateLimited { .. }
        )
    }

    /// Whether this is a rate-limit-class error (steeper limiter decay).
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// How far this failure reaches.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Validation { .. }
            | Self::TransientNetwork { .. }
            | Self::RateLimited { .. }
            | Self::NotFound { .. }
            | Self::Conflict { .. }
            | Self::Checkpoint { .. } => Severity::Record,
            Self::Internal { .. } => Severity::Batch,
            Self::Auth { .. } | Self::CriticalStore { .. } => Severity::Run,
        }
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(err: sea_orm::DbErr) -> Self {
        // Connection loss and missing schema both make further batches
        // pointless; everything from the store is classified as critical.
        Self::CriticalStore {
            message: err.to_string(),
        }
    }
}

/// Extract the first line of an error message for progress reporting.
#[inline]
#[must_use]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::network("reset by peer").is_retryable());
        assert!(SyncError::RateLimited { reset_at: None }.is_retryable());

        assert!(!SyncError::validation("title", "empty").is_retryable());
        assert!(!SyncError::auth("bad key").is_retryable());
        assert!(!SyncError::not_found("prod_1").is_retryable());
        assert!(!SyncError::conflict("duplicate").is_retryable());
        assert!(!SyncError::store("no such table").is_retryable());
    }

    #[test]
    fn severity_classification() {
        assert_eq!(
            SyncError::validation("price", "zero").severity(),
            Severity::Record
        );
        assert_eq!(SyncError::network("timeout").severity(), Severity::Record);
        assert_eq!(SyncError::auth("expired").severity(), Severity::Run);
        assert_eq!(
            SyncError::store("missing table products").severity(),
            Severity::Run
        );
        assert_eq!(SyncError::internal("bug").severity(), Severity::Batch);
    }

    #[test]
    fn rate_limited_display_includes_reset() {
        let at = Utc::now();
        let err = SyncError::RateLimited { reset_at: Some(at) };
        assert!(err.to_string().contains("resets at"));

        let err = SyncError::RateLimited { reset_at: None };
        assert!(!err.to_string().contains("resets at"));
    }

    #[test]
    fn db_error_maps_to_critical_store() {
        let err: SyncError = sea_orm::DbErr::Custom("no such table: products".to_string()).into();
        assert!(matches!(err, SyncError::CriticalStore { .. }));
        assert_eq!(err.severity(), Severity::Run);
    }

    #[test]
    fn short_message_takes_first_line() {
        let err = SyncError::network("connection reset\nbacktrace: ...");
        assert_eq!(short_error_message(&err), "network error: connection reset");
    }
}
