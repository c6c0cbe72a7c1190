//! Audit event and exported log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use guardrail_contracts::lifecycle::LifecycleRecord;

/// One link of the deployment hash chain.
///
/// `this_hash` commits to the trail id, the position, the previous link, and
/// the full lifecycle record. Editing any of them breaks this link and every
/// link after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub trail_id: String,
    pub record: LifecycleRecord,
    /// `this_hash` of the previous event, or [`AuditEvent::GENESIS_HASH`].
    pub prev_hash: String,
    pub this_hash: String,
}

impl AuditEvent {
    /// `prev_hash` of the first event in every trail: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of a whole trail, ready to persist or seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub trail_id: String,
    pub events: Vec<AuditEvent>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last event; empty for an empty trail.
    pub terminal_hash: String,
}
