//! Error taxonomy for an audit run.
//!
//! Every component below the binary entry point reports failures as an
//! [`AuditError`]. The analyzer decides, per run, whether a per-key error
//! aborts the run or is recorded as a skipped key.

use thiserror::Error;

/// Errors surfaced by the audit pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// Missing or invalid run parameters. Always fatal, raised before a run starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Listing or fetching from the object store failed.
    #[error("object store access failed for {target}: {reason}")]
    StoreAccess {
        target: String,
        reason: String,
        /// Whether a retry could plausibly succeed (timeouts, 5xx, connection resets).
        transient: bool,
    },

    /// An object key does not carry a parseable timestamp at the expected offset.
    #[error("malformed object key {key}: {reason}")]
    KeyFormat { key: String, reason: String },

    /// A submission body is not valid JSON or lacks a required field.
    #[error("cannot decode submission {key}: {reason}")]
    Decode { key: String, reason: String },

    /// The last-execution marker could not be read or written.
    #[error("execution marker error: {0}")]
    Marker(String),

    /// The downstream row sink rejected an upsert.
    #[error("row sink error: {0}")]
    Sink(String),
}

impl AuditError {
    /// Build a store access error that is worth retrying.
    pub fn transient(target: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::StoreAccess {
            target: target.into(),
            reason: reason.into(),
            transient: true,
        }
    }

    /// Build a store access error that will fail the same way on retry.
    pub fn permanent(target: impl Into<String>, reason: impl Into<String>) -> Self {
        AuditError::StoreAccess {
            target: target.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    /// Only transient store failures are retried; format and decode errors are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::StoreAccess { transient: true, .. })
    }

    /// Short label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::Config(_) => "config",
            AuditError::StoreAccess { .. } => "store-access",
            AuditError::KeyFormat { .. } => "key-format",
            AuditError::Decode { .. } => "decode",
            AuditError::Marker(_) => "marker",
            AuditError::Sink(_) => "sink",
        }
    }
}
