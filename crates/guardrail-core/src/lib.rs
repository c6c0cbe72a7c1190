//! # guardrail-core
//!
//! The deployment side of the banking guardrail toolkit.
//!
//! This crate provides:
//! - The collaborator traits (`PolicyService`, `KeyService`, `AuditWriter`,
//!   `Sleeper`) that mark the boundary to remote services and local sinks
//! - `CancellationToken` and `ThreadSleeper` for cancellable poll loops
//! - The `Reconciler` that drives a policy resource through creation,
//!   versioning, activation, and status polling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guardrail_core::{Reconciler, PollOptions};
//!
//! let reconciler = Reconciler::new(Box::new(policy_service), Box::new(key_service), config);
//! let mut handle = reconciler.create(&validated)?;
//! reconciler.poll_until_terminal(&mut handle, &reconciler.poll_options())?;
//! ```

pub mod cancel;
pub mod reconciler;
pub mod traits;

pub use cancel::{CancellationToken, ThreadSleeper};
pub use reconciler::{DeployOutcome, PollOptions, Reconciler, ResourceListing};
