//! Collaborator traits for the deployment pipeline.
//!
//! - `PolicyService` is the remote policy-management service
//! - `KeyService` is the remote key-management service
//! - `AuditWriter` records every lifecycle step
//! - `Sleeper` waits between polls and retries
//!
//! The remote traits return `RemoteError` exactly as the service reported it.
//! Mapping onto `GuardrailError` happens in the reconciler and the envelope,
//! so the original code, message, and request id always survive.

use std::time::Duration;

use guardrail_contracts::{
    error::GuardrailResult,
    lifecycle::LifecycleRecord,
    remote::{
        CreateRequest, CreateResponse, CreateVersionRequest, CreateVersionResponse, DecryptOutput,
        EncryptOutput, EncryptionContext, KeyMetadata, RemoteError, ResourceSnapshot,
        ResourceSummary, UpdateRequest, UpdateResponse,
    },
};

use crate::cancel::CancellationToken;

/// The remote policy-management service.
///
/// Mutating calls carry a client request token; the service treats a
/// repeated token as the same logical call.
pub trait PolicyService: Send + Sync {
    fn create(&self, request: &CreateRequest) -> Result<CreateResponse, RemoteError>;

    /// Current status, versions, working configuration, and revision.
    fn get(&self, id: &str) -> Result<ResourceSnapshot, RemoteError>;

    fn create_version(
        &self,
        request: &CreateVersionRequest,
    ) -> Result<CreateVersionResponse, RemoteError>;

    /// Full-replacement update. Fails with a conflict when
    /// `request.expected_revision` no longer matches the resource.
    fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, RemoteError>;

    fn list(&self, max_results: u32) -> Result<Vec<ResourceSummary>, RemoteError>;
}

/// The remote key-management service.
pub trait KeyService: Send + Sync {
    fn describe_key(&self, key_ref: &str) -> Result<KeyMetadata, RemoteError>;

    /// Encrypt `plaintext` under `key_ref`, binding `context` as
    /// authenticated data.
    fn encrypt(
        &self,
        key_ref: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<EncryptOutput, RemoteError>;

    /// Decrypt `ciphertext`. Fails unless `context` matches the one used to
    /// encrypt exactly.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<DecryptOutput, RemoteError>;
}

/// Append-only sink for lifecycle records.
pub trait AuditWriter: Send + Sync {
    fn write(&self, record: &LifecycleRecord) -> GuardrailResult<()>;
}

/// Waits between poll attempts and read retries.
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`, or until `cancel` fires.
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>) -> bool;
}
