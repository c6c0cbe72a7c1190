//! Error taxonomy for the guardrail toolkit.
//!
//! Every public operation returns `GuardrailResult<T>`. Each variant maps to
//! one machine-readable [`ErrorKind`], and variants that originate on the
//! remote side carry the service's diagnostics untouched so operators can
//! tell a malformed request from an outage from a concurrent edit.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::{
    lifecycle::LifecycleState,
    remote::{RemoteDiagnostics, RemoteError, RemoteErrorKind, ResourceStatus},
    validation::Violation,
};

/// Machine-readable error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Compilation,
    Validation,
    RemoteRejected,
    NotFound,
    Conflict,
    KeyUnavailable,
    Timeout,
    Cancelled,
    Envelope,
    InvalidTransition,
    Config,
    Unknown,
}

/// The unified error type.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// An override referenced an unknown rule kind/type or carried a bad parameter.
    #[error("policy compilation failed: {reason}")]
    Compilation { reason: String },

    /// The compiled document violated one or more rules. Always carries the
    /// full list.
    #[error("policy validation failed: {}", join_violations(.violations))]
    Validation { violations: Vec<Violation> },

    /// The remote service refused the request as malformed or not permitted.
    #[error("remote service rejected the request: {0}")]
    RemoteRejected(RemoteDiagnostics),

    #[error("resource not found: {0}")]
    NotFound(RemoteDiagnostics),

    /// A version or state race detected by the remote service.
    #[error("concurrent modification detected: {0}")]
    Conflict(RemoteDiagnostics),

    /// The encryption key could not be described or is not enabled.
    #[error("encryption key '{key_ref}' is unavailable: {reason}")]
    KeyUnavailable {
        key_ref: String,
        reason: String,
        diagnostics: Option<RemoteDiagnostics>,
    },

    /// Polling ran out of attempts (or hit its deadline) before a terminal status.
    #[error("resource '{resource_id}' did not reach a terminal status after {attempts} poll(s)")]
    Timeout {
        resource_id: String,
        attempts: u32,
        last_status: Option<ResourceStatus>,
    },

    /// The caller cancelled the poll loop.
    #[error("polling of resource '{resource_id}' cancelled after {attempts} poll(s)")]
    Cancelled { resource_id: String, attempts: u32 },

    /// Sealing or opening an encrypted envelope failed. Not transient.
    #[error("envelope operation failed: {reason}")]
    Envelope {
        reason: String,
        diagnostics: Option<RemoteDiagnostics>,
    },

    /// An operation was issued from a lifecycle state that does not allow it.
    #[error("cannot {operation} a resource in state {from}")]
    InvalidTransition {
        from: LifecycleState,
        operation: &'static str,
    },

    /// A configuration value is missing or malformed.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Anything else; the remote diagnostics are kept for triage.
    #[error("unexpected remote error: {0}")]
    Unknown(RemoteDiagnostics),
}

/// Convenience alias used throughout the guardrail crates.
pub type GuardrailResult<T> = Result<T, GuardrailError>;

impl GuardrailError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardrailError::Compilation { .. } => ErrorKind::Compilation,
            GuardrailError::Validation { .. } => ErrorKind::Validation,
            GuardrailError::RemoteRejected(_) => ErrorKind::RemoteRejected,
            GuardrailError::NotFound(_) => ErrorKind::NotFound,
            GuardrailError::Conflict(_) => ErrorKind::Conflict,
            GuardrailError::KeyUnavailable { .. } => ErrorKind::KeyUnavailable,
            GuardrailError::Timeout { .. } => ErrorKind::Timeout,
            GuardrailError::Cancelled { .. } => ErrorKind::Cancelled,
            GuardrailError::Envelope { .. } => ErrorKind::Envelope,
            GuardrailError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            GuardrailError::Config { .. } => ErrorKind::Config,
            GuardrailError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// The remote service's code/message/request id, when the error came from it.
    pub fn diagnostics(&self) -> Option<&RemoteDiagnostics> {
        match self {
            GuardrailError::RemoteRejected(d)
            | GuardrailError::NotFound(d)
            | GuardrailError::Conflict(d)
            | GuardrailError::Unknown(d) => Some(d),
            GuardrailError::KeyUnavailable { diagnostics, .. }
            | GuardrailError::Envelope { diagnostics, .. } => diagnostics.as_ref(),
            _ => None,
        }
    }

    /// Timeout and cancellation leave the remote resource untouched; the
    /// caller may re-poll or re-activate the same version.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GuardrailError::Timeout { .. } | GuardrailError::Cancelled { .. })
    }
}

impl From<RemoteError> for GuardrailError {
    /// Map a policy-service error onto the taxonomy.
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::Validation | RemoteErrorKind::AccessDenied => {
                GuardrailError::RemoteRejected(err.diagnostics)
            }
            RemoteErrorKind::NotFound => GuardrailError::NotFound(err.diagnostics),
            RemoteErrorKind::Conflict => GuardrailError::Conflict(err.diagnostics),
            RemoteErrorKind::Throttling
            | RemoteErrorKind::ServiceUnavailable
            | RemoteErrorKind::InvalidCiphertext
            | RemoteErrorKind::Internal => GuardrailError::Unknown(err.diagnostics),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("[{}] {}", v.rule_id, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}
