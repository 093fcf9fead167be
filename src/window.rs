//! Time window resolution and the last-execution marker.
//!
//! A run covers the submissions written strictly between the previous
//! invocation and now. When no previous invocation is recorded the window
//! falls back to a fixed lookback.

use crate::error::AuditError;
use crate::models::TimeWindow;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Persisted "last execution" timestamp.
pub trait ExecutionMarker: Send + Sync {
    /// Returns `Ok(None)` when no run has been recorded yet.
    fn read(&self) -> Result<Option<DateTime<Utc>>, AuditError>;

    fn write(&self, at: DateTime<Utc>) -> Result<(), AuditError>;
}

/// Marker stored as a single RFC3339 line in a file.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExecutionMarker for FileMarker {
    fn read(&self) -> Result<Option<DateTime<Utc>>, AuditError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuditError::Marker(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        DateTime::parse_from_rfc3339(trimmed)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                AuditError::Marker(format!(
                    "{} does not hold an RFC3339 timestamp ({:?}): {}",
                    self.path.display(),
                    trimmed,
                    e
                ))
            })
    }

    fn write(&self, at: DateTime<Utc>) -> Result<(), AuditError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let marker_err =
            |e: std::io::Error| AuditError::Marker(format!("cannot write {}: {}", self.path.display(), e));

        // Write next to the target and rename so a crash never leaves a torn marker.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(marker_err)?;
        writeln!(tmp, "{}", at.to_rfc3339()).map_err(marker_err)?;
        tmp.persist(&self.path).map_err(|e| marker_err(e.error))?;

        debug!("Recorded last execution {} in {}", at, self.path.display());
        Ok(())
    }
}

/// Derives the window for the current invocation.
#[derive(Debug, Clone, Copy)]
pub struct WindowResolver {
    lookback: Duration,
}

impl WindowResolver {
    /// Default lookback when no previous execution is recorded.
    pub const DEFAULT_LOOKBACK_HOURS: u64 = 12;

    pub fn new(lookback_hours: u64) -> Result<Self, AuditError> {
        if lookback_hours == 0 {
            return Err(AuditError::Config(
                "lookback must be at least one hour".to_string(),
            ));
        }
        let hours = i64::try_from(lookback_hours)
            .map_err(|_| AuditError::Config(format!("lookback {}h is too large", lookback_hours)))?;
        let lookback = Duration::try_hours(hours)
            .ok_or_else(|| AuditError::Config(format!("lookback {}h is too large", lookback_hours)))?;
        Ok(Self { lookback })
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Resolve `(last_execution, now)`, falling back to `now - lookback`.
    ///
    /// A marker that is not strictly before `now` is ignored with a warning.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        last_execution: Option<DateTime<Utc>>,
    ) -> Result<TimeWindow, AuditError> {
        let start = match last_execution {
            Some(last) if last < now => last,
            Some(last) => {
                warn!(
                    "Last execution marker {} is not before now ({}); using {}h lookback",
                    last,
                    now,
                    self.lookback.num_hours()
                );
                now - self.lookback
            }
            None => {
                debug!(
                    "No previous execution recorded; using {}h lookback",
                    self.lookback.num_hours()
                );
                now - self.lookback
            }
        };

        TimeWindow::new(start, now)
    }
}

impl Default for WindowResolver {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(Self::DEFAULT_LOOKBACK_HOURS as i64),
        }
    }
}

/// Every UTC date the window touches, oldest first.
pub fn date_partitions(window: &TimeWindow) -> Vec<NaiveDate> {
    let last = window.end().date_naive();
    let mut dates = Vec::new();
    let mut day = window.start().date_naive();

    while day <= last {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    dates
}
