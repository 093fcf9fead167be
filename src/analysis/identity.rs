//! Submitter identities and the per-run registry.

use crate::models::{Identity, SubmissionRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Joins public key and address before hashing. Neither base58 keys nor IPs contain it.
const ID_SEPARATOR: &str = "-";

/// Compute the stable identity for a (public key, IP) pair.
///
/// The id is the hex SHA-256 of `public_key + "-" + ip`: order sensitive,
/// unsalted, identical across runs and processes.
pub fn resolve_identity(public_key: &str, public_ip: &str) -> Identity {
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_bytes());
    hasher.update(ID_SEPARATOR.as_bytes());
    hasher.update(public_ip.as_bytes());

    Identity {
        id: hex::encode(hasher.finalize()),
        public_key: public_key.to_string(),
        public_ip: public_ip.to_string(),
    }
}

/// Identity of the submitter behind a record.
pub fn identity_of(record: &SubmissionRecord) -> Identity {
    resolve_identity(&record.submitter_public_key, &record.remote_addr)
}

/// Deduplicated identities seen in one run, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRegistry {
    entries: BTreeMap<String, Identity>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `identity` unless its id is already registered.
    ///
    /// Returns `true` when the identity was new. Later duplicates never
    /// overwrite the first entry.
    pub fn register(&mut self, identity: Identity) -> bool {
        match self.entries.entry(identity.id.clone()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(identity);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_identity_is_deterministic() {
        let a = resolve_identity("B62qabc", "1.2.3.4");
        let b = resolve_identity("B62qabc", "1.2.3.4");
        assert_eq!(a, b);
        assert_eq!(a.id.len(), 64);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_known_value() {
        // sha256("abc-1.2.3.4")
        assert_eq!(
            resolve_identity("abc", "1.2.3.4").id,
            "454b2729a56fcdbf5c8cec468d534dca4aae95192a02cb05edd198bc8dbe6470"
        );
    }

    #[test]
    fn test_identity_is_order_sensitive() {
        let forward = resolve_identity("1.2.3.4", "abc");
        let reverse = resolve_identity("abc", "1.2.3.4");
        assert_ne!(forward.id, reverse.id);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_ids() {
        let mut seen = std::collections::HashSet::new();
        for key in 0..50 {
            for ip in 0..20 {
                let identity = resolve_identity(&format!("B62q{:04}", key), &format!("10.0.0.{}", ip));
                assert!(seen.insert(identity.id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = IdentityRegistry::new();
        let identity = resolve_identity("abc", "1.2.3.4");

        assert!(registry.register(identity.clone()));
        assert!(!registry.register(identity.clone()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next(), Some(&identity));
    }

    #[test]
    fn test_duplicate_submissions_register_once() {
        let record = |hour: u32| SubmissionRecord {
            key: format!("net/submissions/2024-01-01/2024-01-01T{:02}:00:00Z-abc.json", hour),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            submitter_public_key: "abc".to_string(),
            remote_addr: "1.2.3.4".to_string(),
            peer_id: None,
            block_hash: None,
        };

        let mut registry = IdentityRegistry::new();
        registry.register(identity_of(&record(3)));
        registry.register(identity_of(&record(9)));

        assert_eq!(registry.len(), 1);
        let only = registry.iter().next().unwrap();
        assert_eq!(only.public_key, "abc");
        assert_eq!(only.public_ip, "1.2.3.4");
    }
}
