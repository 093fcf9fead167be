//! Object store scanner for discovering in-window submissions.
//!
//! Submissions live under date partitions,
//! `<network>/submissions/<YYYY-MM-DD>/<RFC3339 timestamp>...`. The scanner
//! drains the full paginated listing of a partition, then keeps the keys
//! whose embedded timestamp lies strictly inside the run window.

use crate::error::AuditError;
use crate::models::{FailurePolicy, ScannedKey, SkippedKey, TimeWindow};
use crate::store::ObjectStore;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Length of the `YYYY-MM-DDTHH:MM:SSZ` timestamp embedded in each key.
pub const KEY_TIMESTAMP_LEN: usize = 20;

/// Key prefix of one date partition.
pub fn partition_prefix(network: &str, date: NaiveDate) -> String {
    format!("{}/submissions/{}", network, date.format("%Y-%m-%d"))
}

/// Extract the submission timestamp that follows `<prefix>/` in `key`.
pub fn parse_key_timestamp(key: &str, prefix: &str) -> Result<DateTime<Utc>, AuditError> {
    let malformed = |reason: String| AuditError::KeyFormat {
        key: key.to_string(),
        reason,
    };

    let rest = key
        .strip_prefix(prefix)
        .ok_or_else(|| malformed(format!("not under partition {}", prefix)))?;
    let rest = rest
        .strip_prefix('/')
        .ok_or_else(|| malformed("no '/' after the partition prefix".to_string()))?;

    let raw = rest.get(..KEY_TIMESTAMP_LEN).ok_or_else(|| {
        malformed(format!(
            "key too short for a {}-character timestamp",
            KEY_TIMESTAMP_LEN
        ))
    })?;

    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| malformed(format!("{:?} is not an RFC3339 timestamp: {}", raw, e)))
}

/// Result of scanning one partition.
#[derive(Debug, Clone, Default)]
pub struct PartitionScan {
    /// Keys returned by the listing, before filtering.
    pub listed: usize,
    /// In-window keys sorted by `(timestamp, key)`.
    pub in_window: Vec<ScannedKey>,
    pub skipped: Vec<SkippedKey>,
}

/// Scanner over an object store.
pub struct SubmissionScanner<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> SubmissionScanner<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// List every key under `prefix`, following continuation tokens to the end.
    pub async fn list_all(&self, prefix: &str) -> Result<Vec<String>, AuditError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self.store.list_page(prefix, continuation.as_deref()).await?;
            pages += 1;
            keys.extend(page.keys);

            match page.next_continuation {
                Some(next) if !seen_tokens.insert(next.clone()) => {
                    return Err(AuditError::permanent(
                        prefix,
                        format!("listing repeated continuation token {:?}", next),
                    ));
                }
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!("Listed {} keys under {} in {} page(s)", keys.len(), prefix, pages);
        Ok(keys)
    }

    /// List a partition and keep the keys inside `window`.
    pub async fn scan_partition(
        &self,
        prefix: &str,
        window: &TimeWindow,
        policy: FailurePolicy,
    ) -> Result<PartitionScan, AuditError> {
        let keys = self.list_all(prefix).await?;
        let mut scan = PartitionScan {
            listed: keys.len(),
            ..PartitionScan::default()
        };

        for key in keys {
            if !key.starts_with(prefix) {
                debug!("Ignoring {} returned for prefix {}", key, prefix);
                continue;
            }

            match parse_key_timestamp(&key, prefix) {
                Ok(timestamp) if window.contains(timestamp) => {
                    scan.in_window.push(ScannedKey { key, timestamp });
                }
                Ok(_) => {}
                Err(e) => match policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!("Skipping key: {}", e);
                        scan.skipped.push(SkippedKey::from_error(&key, &e));
                    }
                },
            }
        }

        scan.in_window
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    const PREFIX: &str = "berkeley/submissions/2024-01-01";

    /// Listing whose continuation tokens cycle A -> B -> A.
    struct CyclingStore;

    #[async_trait::async_trait]
    impl ObjectStore for CyclingStore {
        async fn list_page(
            &self,
            _prefix: &str,
            continuation: Option<&str>,
        ) -> Result<crate::store::ListPage, AuditError> {
            let next = match continuation {
                None | Some("B") => "A",
                Some(_) => "B",
            };
            Ok(crate::store::ListPage {
                keys: vec![key("2024-01-01T06:00:00Z")],
                next_continuation: Some(next.to_string()),
            })
        }

        async fn get_object(&self, key: &str) -> Result<Vec<u8>, AuditError> {
            Err(AuditError::permanent(key, "not stored"))
        }
    }

    fn key(ts: &str) -> String {
        format!("{}/{}-B62qsubmitter.json", PREFIX, ts)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_partition_prefix() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(partition_prefix("berkeley", date), PREFIX);
    }

    #[test]
    fn test_parse_key_timestamp() {
        let ts = parse_key_timestamp(&key("2024-01-01T06:00:00Z"), PREFIX).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_key_timestamp_rejects_malformed() {
        let short = format!("{}/2024-01-01T06", PREFIX);
        assert!(matches!(
            parse_key_timestamp(&short, PREFIX),
            Err(AuditError::KeyFormat { .. })
        ));

        let garbage = key("not-a-timestamp-at-all");
        assert!(matches!(
            parse_key_timestamp(&garbage, PREFIX),
            Err(AuditError::KeyFormat { .. })
        ));

        let no_slash = format!("{}X2024-01-01T06:00:00Z", PREFIX);
        assert!(parse_key_timestamp(&no_slash, PREFIX).is_err());
    }

    #[tokio::test]
    async fn test_window_scenario_excludes_boundaries() {
        let store = MemoryStore::new(100)
            .with_object(&key("2023-12-31T23:00:00Z"), "{}")
            .with_object(&key("2024-01-01T00:00:00Z"), "{}")
            .with_object(&key("2024-01-01T06:00:00Z"), "{}")
            .with_object(&key("2024-01-01T12:00:00Z"), "{}");

        let scanner = SubmissionScanner::new(&store);
        let scan = scanner
            .scan_partition(PREFIX, &window(), FailurePolicy::Abort)
            .await
            .unwrap();

        assert_eq!(scan.listed, 4);
        let keys: Vec<&str> = scan.in_window.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec![key("2024-01-01T06:00:00Z").as_str()]);
    }

    #[tokio::test]
    async fn test_consumes_all_pages() {
        // 9 keys at page size 3: in-window keys sit on every page.
        let stamps = [
            "2024-01-01T00:00:00Z",
            "2024-01-01T01:00:00Z",
            "2024-01-01T02:00:00Z",
            "2024-01-01T05:00:00Z",
            "2024-01-01T07:00:00Z",
            "2024-01-01T09:00:00Z",
            "2024-01-01T11:00:00Z",
            "2024-01-01T12:00:00Z",
            "2024-01-01T13:00:00Z",
        ];
        let mut store = MemoryStore::new(3);
        for stamp in stamps {
            store = store.with_object(&key(stamp), "{}");
        }

        let scanner = SubmissionScanner::new(&store);
        let scan = scanner
            .scan_partition(PREFIX, &window(), FailurePolicy::Abort)
            .await
            .unwrap();

        assert_eq!(store.list_calls.load(Ordering::SeqCst), 3);
        assert_eq!(scan.listed, 9);
        assert_eq!(scan.in_window.len(), 6);
        assert_eq!(scan.in_window[0].key, key("2024-01-01T01:00:00Z"));
        assert_eq!(scan.in_window[5].key, key("2024-01-01T11:00:00Z"));
    }

    #[tokio::test]
    async fn test_malformed_key_policy() {
        let bad = format!("{}/garbage.json", PREFIX);
        let store = MemoryStore::new(10)
            .with_object(&bad, "{}")
            .with_object(&key("2024-01-01T06:00:00Z"), "{}");
        let scanner = SubmissionScanner::new(&store);

        let err = scanner
            .scan_partition(PREFIX, &window(), FailurePolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::KeyFormat { ref key, .. } if key == &bad));

        let scan = scanner
            .scan_partition(PREFIX, &window(), FailurePolicy::Skip)
            .await
            .unwrap();
        assert_eq!(scan.in_window.len(), 1);
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].key, bad);
        assert_eq!(scan.skipped[0].kind, "key-format");
    }

    #[tokio::test]
    async fn test_list_all_stops_on_token_cycle() {
        let store = CyclingStore;
        let scanner = SubmissionScanner::new(&store);

        let err = scanner.list_all(PREFIX).await.unwrap_err();
        assert!(matches!(err, AuditError::StoreAccess { transient: false, .. }));
        assert!(err.to_string().contains("\"A\""));
    }
}
