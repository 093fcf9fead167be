//! Run orchestration: window, scan, fetch and decode, identity registration.

use crate::analysis::identity::{identity_of, IdentityRegistry};
use crate::decoder::decode_submission;
use crate::error::AuditError;
use crate::models::{FailurePolicy, ScannedKey, SkippedKey, SubmissionRecord, TimeWindow};
use crate::scanner::{partition_prefix, SubmissionScanner};
use crate::store::ObjectStore;
use crate::window::{date_partitions, Clock, ExecutionMarker, WindowResolver};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-run analyzer settings.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// Network name, the first component of every object key.
    pub network: String,
    /// Maximum in-flight object fetches.
    pub concurrency: usize,
    pub policy: FailurePolicy,
    /// Replaces the recorded last execution as the window start.
    pub start_override: Option<DateTime<Utc>>,
}

/// Keys selected for a window, before any object is fetched.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub window: TimeWindow,
    pub partitions: Vec<String>,
    pub keys_listed: usize,
    pub keys: Vec<ScannedKey>,
    pub skipped: Vec<SkippedKey>,
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub window: TimeWindow,
    pub partitions: Vec<String>,
    pub keys_listed: usize,
    /// Decoded in-window submissions, in `(timestamp, key)` order.
    pub submissions: Vec<SubmissionRecord>,
    pub registry: IdentityRegistry,
    /// Empty unless the policy is [`FailurePolicy::Skip`].
    pub skipped: Vec<SkippedKey>,
}

/// Composes window resolution, scanning, decoding and identity registration.
pub struct Analyzer {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    resolver: WindowResolver,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        resolver: WindowResolver,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            store,
            clock,
            resolver,
            settings,
        }
    }

    /// Window from the start override or the marker, ending now.
    pub fn resolve_window(&self, marker: &dyn ExecutionMarker) -> Result<TimeWindow, AuditError> {
        let now = self.clock.now();
        let last = match self.settings.start_override {
            Some(start) => Some(start),
            None => marker.read()?,
        };
        self.resolver.resolve(now, last)
    }

    /// Resolve the window and list the in-window keys without fetching them.
    pub async fn scan(&self, marker: &dyn ExecutionMarker) -> Result<ScanOutcome, AuditError> {
        let window = self.resolve_window(marker)?;
        self.scan_window(window).await
    }

    /// List every date partition the window touches and filter its keys.
    pub async fn scan_window(&self, window: TimeWindow) -> Result<ScanOutcome, AuditError> {
        info!("Scanning submissions in window {}", window);

        let scanner = SubmissionScanner::new(self.store.as_ref());
        let mut outcome = ScanOutcome {
            window,
            partitions: Vec::new(),
            keys_listed: 0,
            keys: Vec::new(),
            skipped: Vec::new(),
        };

        for date in date_partitions(&window) {
            let prefix = partition_prefix(&self.settings.network, date);
            let partition = scanner
                .scan_partition(&prefix, &window, self.settings.policy)
                .await?;

            debug!(
                "Partition {}: {} listed, {} in window, {} skipped",
                prefix,
                partition.listed,
                partition.in_window.len(),
                partition.skipped.len()
            );

            outcome.keys_listed += partition.listed;
            outcome.keys.extend(partition.in_window);
            outcome.skipped.extend(partition.skipped);
            outcome.partitions.push(prefix);
        }

        info!(
            "{} of {} listed keys fall inside the window",
            outcome.keys.len(),
            outcome.keys_listed
        );
        Ok(outcome)
    }

    /// Full run: resolve window, scan, fetch and decode, register identities.
    pub async fn run(&self, marker: &dyn ExecutionMarker) -> Result<AnalysisOutcome, AuditError> {
        let window = self.resolve_window(marker)?;
        self.run_window(window).await
    }

    /// Full run over an already resolved window.
    pub async fn run_window(&self, window: TimeWindow) -> Result<AnalysisOutcome, AuditError> {
        let scan = self.scan_window(window).await?;
        let policy = self.settings.policy;
        let store = self.store.as_ref();

        let mut outcome = AnalysisOutcome {
            window: scan.window,
            partitions: scan.partitions,
            keys_listed: scan.keys_listed,
            submissions: Vec::with_capacity(scan.keys.len()),
            registry: IdentityRegistry::new(),
            skipped: scan.skipped,
        };

        // `buffered` yields in input order, so registration order is deterministic.
        let mut decoded = stream::iter(scan.keys.iter())
            .map(|scanned| async move {
                let result = match store.get_object(&scanned.key).await {
                    Ok(body) => decode_submission(scanned, &body),
                    Err(e) => Err(e),
                };
                (scanned, result)
            })
            .buffered(self.settings.concurrency.max(1));

        while let Some((scanned, result)) = decoded.next().await {
            match result {
                Ok(record) => {
                    if outcome.registry.register(identity_of(&record)) {
                        debug!(
                            "New identity {} at {}",
                            record.submitter_public_key, record.remote_addr
                        );
                    }
                    outcome.submissions.push(record);
                }
                Err(e) => match policy {
                    FailurePolicy::Abort => {
                        warn!("Aborting run on {}: {}", scanned.key, e);
                        return Err(e);
                    }
                    FailurePolicy::Skip => {
                        warn!("Skipping {}: {}", scanned.key, e);
                        outcome.skipped.push(SkippedKey::from_error(&scanned.key, &e));
                    }
                },
            }
        }

        info!(
            "Registered {} identities from {} submissions ({} skipped)",
            outcome.registry.len(),
            outcome.submissions.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}
