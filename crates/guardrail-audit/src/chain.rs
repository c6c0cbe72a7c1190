//! SHA-256 hash chain over lifecycle records.
//!
//! Hash input, in order:
//!   1. trail id as UTF-8
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 (64 hex chars)
//!   4. compact JSON of the record

use sha2::{Digest, Sha256};

use guardrail_contracts::lifecycle::LifecycleRecord;

use crate::event::AuditEvent;

/// Lowercase hex SHA-256 of one chain link.
///
/// # Panics
///
/// Panics if `record` fails to serialize, which a `LifecycleRecord` cannot.
pub fn hash_event(trail_id: &str, sequence: u64, record: &LifecycleRecord, prev_hash: &str) -> String {
    let record_json =
        serde_json::to_vec(record).expect("LifecycleRecord always serializes to JSON");

    let mut hasher = Sha256::new();
    hasher.update(trail_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);
    hex::encode(hasher.finalize())
}

/// Check linkage and recompute every hash. An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    first_broken_link(events).is_none()
}

/// Sequence number of the first event that fails verification.
pub fn first_broken_link(events: &[AuditEvent]) -> Option<u64> {
    let mut expected_prev: &str = AuditEvent::GENESIS_HASH;

    for (position, event) in events.iter().enumerate() {
        let recomputed = hash_event(&event.trail_id, event.sequence, &event.record, &event.prev_hash);
        if event.sequence != position as u64
            || event.prev_hash != expected_prev
            || event.this_hash != recomputed
        {
            return Some(position as u64);
        }
        expected_prev = event.this_hash.as_str();
    }
    None
}
