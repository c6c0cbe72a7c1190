//! # guardrail-ref-banking
//!
//! Banking reference runtime for the guardrail toolkit.
//!
//! Runs four end-to-end scenarios against a simulated policy service and an
//! in-process key service:
//!
//! 1. **Provision**: compile the banking catalog with overrides, validate it,
//!    create the resource, and persist the deployment record. Shows the
//!    validator and key checks rejecting bad input before anything is sent.
//! 2. **Rollout**: cut and activate versions, the no-op redeploy, a
//!    concurrent-edit conflict, a poll timeout, and listing.
//! 3. **Grounding**: local factual and temporal checks on assistant replies.
//! 4. **Sealed audit**: a hash-chained lifecycle trail sealed in an
//!    encrypted envelope and verified after opening.
//!
//! No external API calls are made.

use chrono::Utc;

pub mod mock_service;
pub mod scenarios;

/// `base` suffixed with the current UTC time, so repeated runs never collide
/// on the service's unique-name constraint.
pub fn timestamped_name(base: &str) -> String {
    format!("{}-{}", base, Utc::now().format("%Y%m%d%H%M%S"))
}
