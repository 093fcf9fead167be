//! Submission aggregation and statistics.
//!
//! This module turns the filtered submission set into per-identity
//! activity and a few audit diagnostics for the report.

use crate::analysis::identity::{identity_of, IdentityRegistry};
use crate::models::{IdentityActivity, IdentityEntry, SubmissionRecord};
use std::collections::{HashMap, HashSet};

/// Submission count and first/last sighting per identity id.
pub fn activity_by_identity(records: &[SubmissionRecord]) -> HashMap<String, IdentityActivity> {
    let mut activity: HashMap<String, IdentityActivity> = HashMap::new();

    for record in records {
        let id = identity_of(record).id;
        activity
            .entry(id)
            .and_modify(|a| {
                a.submissions += 1;
                a.first_seen = a.first_seen.min(record.timestamp);
                a.last_seen = a.last_seen.max(record.timestamp);
            })
            .or_insert(IdentityActivity {
                submissions: 1,
                first_seen: record.timestamp,
                last_seen: record.timestamp,
            });
    }

    activity
}

/// Join the registry with its activity, busiest identities first.
pub fn identity_entries(
    registry: &IdentityRegistry,
    activity: &HashMap<String, IdentityActivity>,
) -> Vec<IdentityEntry> {
    let mut entries: Vec<IdentityEntry> = registry
        .iter()
        .filter_map(|identity| {
            activity.get(&identity.id).map(|a| IdentityEntry {
                identity: identity.clone(),
                activity: a.clone(),
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.activity
            .submissions
            .cmp(&a.activity.submissions)
            .then_with(|| a.identity.public_key.cmp(&b.identity.public_key))
    });

    entries
}

/// Remote addresses used by more than one public key, most shared first.
pub fn shared_addresses(registry: &IdentityRegistry) -> Vec<(String, usize)> {
    let mut keys_by_addr: HashMap<&str, HashSet<&str>> = HashMap::new();

    for identity in registry.iter() {
        keys_by_addr
            .entry(identity.public_ip.as_str())
            .or_default()
            .insert(identity.public_key.as_str());
    }

    let mut shared: Vec<(String, usize)> = keys_by_addr
        .into_iter()
        .filter(|(_, keys)| keys.len() > 1)
        .map(|(addr, keys)| (addr.to_string(), keys.len()))
        .collect();

    shared.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    shared
}

/// Number of distinct public keys, regardless of address.
pub fn distinct_public_keys(registry: &IdentityRegistry) -> usize {
    registry
        .iter()
        .map(|identity| identity.public_key.as_str())
        .collect::<HashSet<_>>()
        .len()
}
