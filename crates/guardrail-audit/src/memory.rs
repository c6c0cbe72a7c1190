//! In-memory deployment audit trail.
//!
//! `InMemoryAuditTrail` is cheap to clone; clones share one chain. Hand one
//! clone to the reconciler with `with_audit` and keep another to export or
//! verify the trail afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use guardrail_contracts::{error::GuardrailResult, lifecycle::LifecycleRecord};
use guardrail_core::traits::AuditWriter;

use crate::{
    chain::{hash_event, verify_chain},
    event::{AuditEvent, AuditLog},
};

pub(crate) struct TrailState {
    pub(crate) events: Vec<AuditEvent>,
    pub(crate) last_hash: String,
}

/// Append-only, SHA-256 chained record of every reconciler step.
#[derive(Clone)]
pub struct InMemoryAuditTrail {
    trail_id: String,
    pub(crate) state: Arc<Mutex<TrailState>>,
}

impl InMemoryAuditTrail {
    pub fn new(trail_id: impl Into<String>) -> Self {
        Self {
            trail_id: trail_id.into(),
            state: Arc::new(Mutex::new(TrailState {
                events: Vec::new(),
                last_hash: AuditEvent::GENESIS_HASH.to_string(),
            })),
        }
    }

    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the chain as it stands now.
    pub fn export_log(&self) -> AuditLog {
        let state = self.lock();
        AuditLog {
            trail_id: self.trail_id.clone(),
            events: state.events.clone(),
            exported_at: Utc::now(),
            terminal_hash: state.events.last().map(|e| e.this_hash.clone()).unwrap_or_default(),
        }
    }

    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.lock().events)
    }

    // `write` mutates only after hashing, so a poisoned chain is still consistent.
    fn lock(&self) -> MutexGuard<'_, TrailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuditWriter for InMemoryAuditTrail {
    fn write(&self, record: &LifecycleRecord) -> GuardrailResult<()> {
        let mut state = self.lock();
        let sequence = state.events.len() as u64;
        let prev_hash = state.last_hash.clone();
        let this_hash = hash_event(&self.trail_id, sequence, record, &prev_hash);

        debug!(
            trail_id = %self.trail_id,
            sequence,
            resource_id = %record.resource_id,
            operation = %record.operation,
            "audit event appended"
        );

        state.events.push(AuditEvent {
            sequence,
            trail_id: self.trail_id.clone(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.last_hash = this_hash;
        Ok(())
    }
}
