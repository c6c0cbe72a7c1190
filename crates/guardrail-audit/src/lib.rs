//! # guardrail-audit
//!
//! Evidence and local persistence for guardrail deployments.
//!
//! ## Overview
//!
//! - [`InMemoryAuditTrail`] implements `AuditWriter`: every reconciler step
//!   becomes an [`AuditEvent`] linked to the previous one by SHA-256, so
//!   editing any stored record is detected by [`verify_chain`].
//! - [`SecureEnvelope`] seals JSON payloads (for example an exported
//!   [`AuditLog`]) through a key service, bound to an encryption context.
//! - [`LocalKeyService`] is an in-process key service for offline runs.
//! - [`RecordStore`] keeps the local deployment record.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let trail = InMemoryAuditTrail::new("deploy-001");
//! let reconciler = Reconciler::new(policies, keys, config).with_audit(Box::new(trail.clone()));
//! // ... create, activate, poll ...
//! assert!(trail.verify_integrity());
//! let sealed = envelope.seal(&serde_json::to_value(trail.export_log())?, key, &ctx)?;
//! ```

pub mod chain;
pub mod envelope;
pub mod event;
pub mod local_kms;
pub mod memory;
pub mod record;

pub use chain::{first_broken_link, hash_event, verify_chain};
pub use envelope::SecureEnvelope;
pub use event::{AuditEvent, AuditLog};
pub use local_kms::LocalKeyService;
pub use memory::InMemoryAuditTrail;
pub use record::{DeploymentRecord, RecordStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
