//! Downstream row sinks.
//!
//! After a run, the host can push one row per identity into an external
//! tabular store. Rows are matched by identity id: an existing row is
//! updated in place, otherwise a new one is appended. The analyzer never
//! calls a sink itself.

pub mod sheets;

pub use sheets::SheetsSink;

use crate::error::AuditError;
use crate::models::{Identity, IdentityActivity, IdentityEntry};
use async_trait::async_trait;
use tracing::{debug, info};

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowUpsert {
    /// An existing row (1-based) was overwritten.
    Updated { row: usize },
    Appended,
}

/// Tabular store keyed by identity id.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn upsert_row(
        &self,
        identity: &Identity,
        activity: &IdentityActivity,
    ) -> Result<RowUpsert, AuditError>;
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub updated: usize,
    pub appended: usize,
}

/// Upsert every entry, stopping at the first sink error.
pub async fn sync_registry(
    sink: &dyn RowSink,
    entries: &[IdentityEntry],
) -> Result<SyncSummary, AuditError> {
    let mut summary = SyncSummary::default();

    for entry in entries {
        match sink.upsert_row(&entry.identity, &entry.activity).await? {
            RowUpsert::Updated { row } => {
                debug!("Updated row {} for {}", row, entry.identity.id);
                summary.updated += 1;
            }
            RowUpsert::Appended => {
                debug!("Appended row for {}", entry.identity.id);
                summary.appended += 1;
            }
        }
    }

    info!(
        "Synced {} identities ({} updated, {} appended)",
        entries.len(),
        summary.updated,
        summary.appended
    );
    Ok(summary)
}

/// Cells written for one identity, in column order.
pub fn row_values(identity: &Identity, activity: &IdentityActivity) -> Vec<String> {
    vec![
        identity.id.clone(),
        identity.public_key.clone(),
        identity.public_ip.clone(),
        activity.submissions.to_string(),
        activity.first_seen.to_rfc3339(),
        activity.last_seen.to_rfc3339(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::identity::resolve_identity;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Sink backed by a map of id to row cells.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl RowSink for MemorySink {
        async fn upsert_row(
            &self,
            identity: &Identity,
            activity: &IdentityActivity,
        ) -> Result<RowUpsert, AuditError> {
            let mut rows = self.rows.lock().unwrap();
            let values = row_values(identity, activity);
            match rows.iter().position(|r| r[0] == identity.id) {
                Some(idx) => {
                    rows[idx] = values;
                    Ok(RowUpsert::Updated { row: idx + 1 })
                }
                None => {
                    rows.push(values);
                    Ok(RowUpsert::Appended)
                }
            }
        }
    }

    fn entry(pk: &str, ip: &str, submissions: usize) -> IdentityEntry {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        IdentityEntry {
            identity: resolve_identity(pk, ip),
            activity: IdentityActivity {
                submissions,
                first_seen: t,
                last_seen: t,
            },
        }
    }

    #[test]
    fn test_row_values_column_order() {
        let e = entry("abc", "1.2.3.4", 7);
        let row = row_values(&e.identity, &e.activity);
        assert_eq!(row[0], e.identity.id);
        assert_eq!(row[1], "abc");
        assert_eq!(row[2], "1.2.3.4");
        assert_eq!(row[3], "7");
        assert_eq!(row.len(), 6);
    }

    #[test]
    fn test_sync_updates_then_appends() {
        let sink = MemorySink::default();

        let first = tokio_test::block_on(sync_registry(
            &sink,
            &[entry("abc", "1.2.3.4", 1), entry("def", "1.2.3.4", 2)],
        ))
        .unwrap();
        assert_eq!(first, SyncSummary { updated: 0, appended: 2 });

        let second = tokio_test::block_on(sync_registry(
            &sink,
            &[entry("abc", "1.2.3.4", 5), entry("ghi", "5.6.7.8", 1)],
        ))
        .unwrap();
        assert_eq!(second, SyncSummary { updated: 1, appended: 1 });

        let rows = sink.rows.lock().unwrap();
        let by_id: HashMap<&str, &Vec<String>> =
            rows.iter().map(|r| (r[0].as_str(), r)).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(by_id[resolve_identity("abc", "1.2.3.4").id.as_str()][3], "5");
    }
}
