//! Request, response, and error shapes exchanged with the remote policy
//! service and the remote key service.
//!
//! These types describe the collaborator boundary only. The services
//! themselves live elsewhere; the traits that consume these types are in
//! `guardrail-core`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::document::{PolicyDocument, RuleGroup};

// ── Statuses and versions ─────────────────────────────────────────────────────

/// Provisioning status reported by the remote service for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ResourceStatus {
    Creating,
    Updating,
    Versioning,
    Ready,
    Active,
    Failed,
    Error,
    Deleting,
    /// A status string this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl ResourceStatus {
    /// ACTIVE, READY, FAILED, and ERROR end a poll loop.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResourceStatus::Active
                | ResourceStatus::Ready
                | ResourceStatus::Failed
                | ResourceStatus::Error
        )
    }

    /// READY is used for resources that need no activation; both count as success.
    pub fn is_success(self) -> bool {
        matches!(self, ResourceStatus::Active | ResourceStatus::Ready)
    }
}

/// Status of one immutable version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Draft,
    Pending,
    Active,
    Failed,
}

/// Monotonically increasing version number assigned by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(pub u32);

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable snapshot of a resource's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    pub version: VersionNumber,
    pub status: VersionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything `get` reports about one remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub id: String,
    pub arn: String,
    pub status: ResourceStatus,
    /// The version the resource currently points at; `None` while it serves
    /// its working draft.
    #[serde(default)]
    pub current_version: Option<VersionNumber>,
    #[serde(default)]
    pub versions: Vec<PolicyVersion>,
    /// The current working configuration.
    pub document: PolicyDocument,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque optimistic-concurrency token; the service bumps it on every write.
    pub revision: u64,
}

impl ResourceSnapshot {
    /// The newest version by creation time, ties broken by version number.
    pub fn latest_version(&self) -> Option<&PolicyVersion> {
        self.versions
            .iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)))
    }

    pub fn version(&self, number: VersionNumber) -> Option<&PolicyVersion> {
        self.versions.iter().find(|v| v.version == number)
    }
}

/// One entry of a `list` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    /// May be empty when the service returns a malformed entry.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub arn: String,
}

// ── Requests and responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub document: PolicyDocument,
    /// Unique per logical call so transport retries cannot create duplicates.
    pub client_request_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub id: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub id: String,
    pub client_request_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionResponse {
    pub version: VersionNumber,
}

/// Full-replacement update of a resource.
///
/// The remote API replaces every field it is given and resets the ones it is
/// not, so callers build this from a fresh snapshot and change only what they
/// intend to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub id: String,
    pub version: VersionNumber,
    pub client_request_token: String,
    /// The snapshot revision this update was derived from. The service
    /// rejects the write with a conflict when the resource moved on.
    pub expected_revision: u64,
    pub name: String,
    pub description: String,
    pub blocked_input_messaging: String,
    pub blocked_outputs_messaging: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_policy: Option<RuleGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_policy: Option<RuleGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_policy: Option<RuleGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_information_policy: Option<RuleGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_grounding_policy: Option<RuleGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub status: ResourceStatus,
}

// ── Key service ───────────────────────────────────────────────────────────────

/// Encryption context: a key/value mapping bound to ciphertext as
/// authenticated data. A sorted map so it has one canonical form.
pub type EncryptionContext = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "PascalCase")]
pub enum KeyState {
    Enabled,
    Disabled,
    PendingDeletion,
    PendingImport,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub key_id: String,
    pub arn: String,
    pub state: KeyState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptOutput {
    pub ciphertext: Vec<u8>,
    pub key_id: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOutput {
    pub plaintext: Vec<u8>,
    pub key_id: String,
    pub algorithm: String,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error classes a remote collaborator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The request was malformed or violated a service-side rule.
    Validation,
    AccessDenied,
    NotFound,
    Conflict,
    Throttling,
    ServiceUnavailable,
    /// The key service refused to decrypt (bad ciphertext or context mismatch).
    InvalidCiphertext,
    Internal,
}

impl RemoteErrorKind {
    /// Whether a read may be retried transparently after this error.
    pub fn is_transient(self) -> bool {
        matches!(self, RemoteErrorKind::Throttling | RemoteErrorKind::ServiceUnavailable)
    }
}

/// The diagnostic payload the remote side attached to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDiagnostics {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl fmt::Display for RemoteDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {request_id})")?;
        }
        Ok(())
    }
}

/// An error returned by a remote collaborator, unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error from remote service: {diagnostics}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub diagnostics: RemoteDiagnostics,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostics: RemoteDiagnostics {
                code: code.into(),
                message: message.into(),
                request_id: None,
            },
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.diagnostics.request_id = Some(request_id.into());
        self
    }
}
