//! Submission body decoding.

use crate::error::AuditError;
use crate::models::{ScannedKey, SubmissionRecord};
use serde::Deserialize;

/// Fields of a stored submission that the auditor reads.
///
/// Stored bodies carry more (snark work, build sha, control port); unknown
/// fields are ignored.
#[derive(Debug, Deserialize)]
struct SubmissionPayload {
    submitter: String,
    remote_addr: String,
    #[serde(default)]
    peer_id: Option<String>,
    #[serde(default)]
    block_hash: Option<String>,
}

/// Decode one object body into a [`SubmissionRecord`].
///
/// The record's timestamp comes from the object key, not the body.
pub fn decode_submission(scanned: &ScannedKey, body: &[u8]) -> Result<SubmissionRecord, AuditError> {
    let decode_err = |reason: String| AuditError::Decode {
        key: scanned.key.clone(),
        reason,
    };

    let payload: SubmissionPayload =
        serde_json::from_slice(body).map_err(|e| decode_err(e.to_string()))?;

    let submitter = payload.submitter.trim();
    if submitter.is_empty() {
        return Err(decode_err("empty `submitter` field".to_string()));
    }
    let remote_addr = payload.remote_addr.trim();
    if remote_addr.is_empty() {
        return Err(decode_err("empty `remote_addr` field".to_string()));
    }

    Ok(SubmissionRecord {
        key: scanned.key.clone(),
        timestamp: scanned.timestamp,
        submitter_public_key: submitter.to_string(),
        remote_addr: remote_addr.to_string(),
        peer_id: payload.peer_id.filter(|p| !p.is_empty()),
        block_hash: payload.block_hash.filter(|h| !h.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn scanned() -> ScannedKey {
        ScannedKey {
            key: "berkeley/submissions/2024-01-01/2024-01-01T06:00:00Z-B62qabc.json".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_decode_full_payload() {
        let body = r#"{
            "created_at": "2024-01-01T06:00:00Z",
            "peer_id": "12D3KooWabc",
            "snark_work": null,
            "remote_addr": "1.2.3.4",
            "submitter": "B62qabc",
            "block_hash": "3NKxyz",
            "graphql_control_port": 3085,
            "built_with_commit_sha": "deadbeef"
        }"#;

        let record = decode_submission(&scanned(), body.as_bytes()).unwrap();
        assert_eq!(record.submitter_public_key, "B62qabc");
        assert_eq!(record.remote_addr, "1.2.3.4");
        assert_eq!(record.peer_id.as_deref(), Some("12D3KooWabc"));
        assert_eq!(record.block_hash.as_deref(), Some("3NKxyz"));
        assert_eq!(record.timestamp, scanned().timestamp);
        assert_eq!(record.key, scanned().key);
    }

    #[test]
    fn test_decode_minimal_payload() {
        let body = br#"{"submitter": "B62qabc", "remote_addr": "1.2.3.4"}"#;
        let record = decode_submission(&scanned(), body).unwrap();
        assert!(record.peer_id.is_none());
        assert!(record.block_hash.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let body = br#"{"submitter": "B62qabc"}"#;
        let err = decode_submission(&scanned(), body).unwrap_err();
        assert!(matches!(err, AuditError::Decode { .. }));
        assert!(err.to_string().contains("remote_addr"));

        let empty = br#"{"submitter": "  ", "remote_addr": "1.2.3.4"}"#;
        assert!(decode_submission(&scanned(), empty).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            decode_submission(&scanned(), b"not json"),
            Err(AuditError::Decode { .. })
        ));
        assert!(decode_submission(&scanned(), b"").is_err());
    }
}
