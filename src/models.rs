//! Data models for the uptime auditor.
//!
//! This module contains the core data structures shared by the scanner,
//! decoder, identity resolver and report generator.

use crate::error::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Open interval of submissions relevant to one run.
///
/// Both bounds are exclusive: a submission stamped exactly at `start` or
/// `end` is outside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AuditError> {
        if start >= end {
            return Err(AuditError::Config(format!(
                "window start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Strict containment: `start < t < end`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start < t && t < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} .. {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// An object key that passed the window filter, with its embedded timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedKey {
    pub key: String,
    pub timestamp: DateTime<Utc>,
}

/// One decoded submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Object key the submission was read from.
    pub key: String,
    /// Timestamp embedded in the object key.
    pub timestamp: DateTime<Utc>,
    /// Public key of the submitting participant.
    pub submitter_public_key: String,
    /// Address the submission was reported from.
    pub remote_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

/// A deduplicated (public key, IP) submitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable hex digest of the key/IP pair.
    pub id: String,
    pub public_key: String,
    pub public_ip: String,
}

/// What to do when a single key fails to parse, fetch or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the whole run on the first per-key error. No partial registry.
    #[default]
    Abort,
    /// Record the key as skipped, log a warning, and continue.
    Skip,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

/// A key that was left out of the registry under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedKey {
    pub key: String,
    /// Error category (`key-format`, `store-access`, `decode`).
    pub kind: String,
    pub reason: String,
}

impl SkippedKey {
    pub fn from_error(key: &str, error: &AuditError) -> Self {
        Self {
            key: key.to_string(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Submission activity of one identity within the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityActivity {
    pub submissions: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One row of the report's identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEntry {
    #[serde(flatten)]
    pub identity: Identity,
    pub activity: IdentityActivity,
}

/// Metadata about an audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub network: String,
    pub bucket: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Date partitions that were listed.
    pub partitions: Vec<String>,
    pub analysis_date: DateTime<Utc>,
    pub keys_listed: usize,
    pub submissions_in_window: usize,
    pub identities: usize,
    pub keys_skipped: usize,
    pub failure_policy: FailurePolicy,
    pub duration_seconds: f64,
}

/// The complete audit report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub identities: Vec<IdentityEntry>,
    /// Remote addresses reported by more than one public key.
    pub shared_addresses: Vec<(String, usize)>,
    pub skipped: Vec<SkippedKey>,
}
