//! Local lifecycle state machine and the handles the reconciler returns.
//!
//! The remote service owns the real resource. Locally we only track which
//! phase of the deployment a handle is in, so that operations issued out of
//! order fail fast instead of reaching the network.
//!
//! ```text
//! ABSENT -> CREATING -> ACTIVE
//!                   \-> FAILED
//! ACTIVE -> VERSIONING -> ACTIVE (new version)
//!                     \-> FAILED
//! ```
//!
//! FAILED is final. A failed resource is not re-activated; the caller
//! creates a fresh one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::remote::{ResourceStatus, VersionNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Absent,
    Creating,
    Active,
    Versioning,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    Submitted,
    VersionRequested,
    ActivationRequested,
    ProvisioningSucceeded,
    ProvisioningFailed,
}

impl LifecycleState {
    /// The state reached by applying `event`, or `None` if the transition is
    /// not legal from this state.
    pub fn next(self, event: LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Absent, E::Submitted) => Some(S::Creating),
            (S::Creating, E::ProvisioningSucceeded) => Some(S::Active),
            (S::Creating, E::ProvisioningFailed) => Some(S::Failed),
            (S::Active, E::VersionRequested) | (S::Versioning, E::VersionRequested) => {
                Some(S::Versioning)
            }
            (S::Active, E::ActivationRequested) | (S::Versioning, E::ActivationRequested) => {
                Some(S::Versioning)
            }
            (S::Versioning, E::ProvisioningSucceeded) | (S::Active, E::ProvisioningSucceeded) => {
                Some(S::Active)
            }
            (S::Versioning, E::ProvisioningFailed) | (S::Active, E::ProvisioningFailed) => {
                Some(S::Failed)
            }
            _ => None,
        }
    }

    /// Map a remote status onto the local phase when attaching to an
    /// existing resource.
    pub fn from_remote(status: ResourceStatus) -> LifecycleState {
        match status {
            ResourceStatus::Active | ResourceStatus::Ready => LifecycleState::Active,
            ResourceStatus::Creating => LifecycleState::Creating,
            ResourceStatus::Updating | ResourceStatus::Versioning => LifecycleState::Versioning,
            ResourceStatus::Failed | ResourceStatus::Error => LifecycleState::Failed,
            ResourceStatus::Deleting | ResourceStatus::Unknown => LifecycleState::Failed,
        }
    }
}

/// Local read/write handle to one remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub state: LifecycleState,
    /// Last status observed from the service; a cache, never authoritative.
    pub last_status: Option<ResourceStatus>,
    /// The version most recently activated through this handle.
    pub active_version: Option<VersionNumber>,
}

/// Identifies a version minted by `cut_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHandle {
    pub resource_id: String,
    pub version: VersionNumber,
    /// The token the version was requested with.
    pub request_token: String,
}

/// Result of pointing a resource at a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub version: VersionNumber,
    /// Status the service reported for the update call.
    pub status: ResourceStatus,
    /// Fields copied forward from the pre-activation snapshot.
    pub carried_fields: Vec<String>,
    /// Fields the update does not carry; the service applies its defaults.
    pub uncarried_fields: Vec<String>,
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    Active,
    Ready,
    Failed { reasons: Vec<String> },
    Error { reasons: Vec<String> },
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Active | TerminalStatus::Ready)
    }
}

// ── Audit records ─────────────────────────────────────────────────────────────

/// The reconciler operation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleOperation {
    Create,
    Attach,
    CutVersion,
    Activate,
    Poll,
}

/// One reconciler step, written to the deployment audit trail.
///
/// Every mutating call and every poll loop that ends produces exactly one
/// record. Status reads outside a poll loop produce none. Records are
/// append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub resource_id: String,
    pub operation: LifecycleOperation,
    pub from: LifecycleState,
    pub to: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<ResourceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionNumber>,
    /// Client request token of the mutating call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleRecord {
    pub fn new(
        resource_id: impl Into<String>,
        operation: LifecycleOperation,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            operation,
            from,
            to,
            remote_status: None,
            version: None,
            request_token: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.remote_status = Some(status);
        self
    }

    pub fn with_version(mut self, version: VersionNumber) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.request_token = Some(token.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
