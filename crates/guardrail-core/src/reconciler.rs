//! The deployment lifecycle reconciler.
//!
//! Drives one remote policy resource through its provisioning state machine:
//!
//!   create → poll → cut_version → activate → poll
//!
//! The remote service owns the real state. The reconciler keeps only a
//! `ResourceHandle` with the local lifecycle phase and the last observed
//! status, and refuses operations the local phase does not allow before any
//! request leaves the process.
//!
//! Mutating calls are never retried; each carries a fresh client request
//! token. Idempotent reads (`get`, `list`) are retried transparently on
//! throttling and service-unavailable errors only.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use guardrail_contracts::{
    config::{GuardrailConfig, PollSettings, MAX_LIST_RESULTS},
    error::{GuardrailError, GuardrailResult},
    lifecycle::{
        ActivationOutcome, LifecycleEvent, LifecycleOperation, LifecycleRecord, LifecycleState,
        ResourceHandle, TerminalStatus, VersionHandle,
    },
    remote::{
        CreateRequest, CreateVersionRequest, KeyMetadata, KeyState, PolicyVersion,
        RemoteDiagnostics, RemoteError, ResourceSnapshot, ResourceStatus, ResourceSummary,
        UpdateRequest, VersionNumber,
    },
};
use guardrail_policy::ValidatedDocument;

use crate::{
    cancel::{CancellationToken, ThreadSleeper},
    traits::{AuditWriter, KeyService, PolicyService, Sleeper},
};

/// Fields `activate` copies from the pre-activation snapshot into the update.
pub const CARRIED_FIELDS: [&str; 10] = [
    "name",
    "description",
    "blockedInputMessaging",
    "blockedOutputsMessaging",
    "kmsKeyId",
    "contentPolicy",
    "wordPolicy",
    "topicPolicy",
    "sensitiveInformationPolicy",
    "contextualGroundingPolicy",
];

/// Fields the update call does not accept; the service keeps or defaults them.
pub const UNCARRIED_FIELDS: [&str; 1] = ["tags"];

/// Description given to versions the reconciler cuts on its own.
const AUTO_VERSION_DESCRIPTION: &str = "Version cut during deployment";

/// Bounds for one poll loop.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Number of status reads before giving up. Must be at least 1.
    pub max_attempts: u32,
    /// Fixed delay between reads. There is no delay after the last read.
    pub interval: Duration,
    /// Wall-clock limit checked before every read.
    pub deadline: Option<Instant>,
    pub cancel: Option<CancellationToken>,
}

impl PollOptions {
    pub fn from_settings(settings: &PollSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            interval: settings.interval(),
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_settings(&PollSettings::default())
    }
}

/// What `deploy` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The resource was already serving; nothing was changed.
    AlreadyActive { version: Option<VersionNumber> },
    /// `version` was activated and polling ended with `status`.
    Activated {
        version: VersionNumber,
        activation: ActivationOutcome,
        status: TerminalStatus,
    },
}

/// One `list` entry with its newest version resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceListing {
    pub summary: ResourceSummary,
    pub latest_version: Option<PolicyVersion>,
}

/// Drives remote policy resources through their lifecycle.
///
/// One reconciler may manage many independent handles; it holds no
/// per-resource state of its own.
pub struct Reconciler {
    policies: Box<dyn PolicyService>,
    keys: Box<dyn KeyService>,
    audit: Option<Box<dyn AuditWriter>>,
    sleeper: Box<dyn Sleeper>,
    config: GuardrailConfig,
}

impl Reconciler {
    pub fn new(
        policies: Box<dyn PolicyService>,
        keys: Box<dyn KeyService>,
        config: GuardrailConfig,
    ) -> Self {
        Self {
            policies,
            keys,
            audit: None,
            sleeper: Box::new(ThreadSleeper::default()),
            config,
        }
    }

    /// Record every lifecycle step to `audit`.
    pub fn with_audit(mut self, audit: Box<dyn AuditWriter>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Poll bounds taken from configuration.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::from_settings(&self.config.poll)
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    /// Submit a validated document as a new remote resource.
    ///
    /// When the document names an encryption key, the key must be
    /// describable and enabled; otherwise `KeyUnavailable` is returned and
    /// nothing is created. Remote rejections propagate with the service's
    /// diagnostics untouched.
    pub fn create(&self, validated: &ValidatedDocument) -> GuardrailResult<ResourceHandle> {
        let document = validated.document();

        if let Some(key_ref) = document.kms_key_id.as_deref() {
            let key = self.check_key(key_ref)?;
            debug!(key_id = %key.key_id, "encryption key is enabled");
        }

        let from = LifecycleState::Absent;
        let to = self.advance(from, LifecycleEvent::Submitted, "create")?;

        let token = Uuid::new_v4().to_string();
        debug!(name = %document.name, token = %token, "submitting policy resource");

        let response = self
            .policies
            .create(&CreateRequest {
                document: document.clone(),
                client_request_token: token.clone(),
            })
            .map_err(|e| remote_failure("create", e))?;

        info!(
            resource_id = %response.id,
            name = %document.name,
            "policy resource created"
        );

        let handle = ResourceHandle {
            id: response.id,
            arn: response.arn,
            name: document.name.clone(),
            state: to,
            last_status: Some(ResourceStatus::Creating),
            active_version: None,
        };

        self.audit(
            LifecycleRecord::new(&handle.id, LifecycleOperation::Create, from, to)
                .with_status(ResourceStatus::Creating)
                .with_token(token),
        );

        Ok(handle)
    }

    /// Build a handle for a resource that already exists remotely.
    pub fn attach(&self, id: &str) -> GuardrailResult<ResourceHandle> {
        let snapshot = self.read(id)?;
        let state = LifecycleState::from_remote(snapshot.status);

        info!(
            resource_id = %snapshot.id,
            status = %snapshot.status,
            state = %state,
            "attached to existing policy resource"
        );

        let handle = ResourceHandle {
            id: snapshot.id.clone(),
            arn: snapshot.arn.clone(),
            name: snapshot.document.name.clone(),
            state,
            last_status: Some(snapshot.status),
            active_version: snapshot.current_version,
        };

        self.audit(
            LifecycleRecord::new(&handle.id, LifecycleOperation::Attach, LifecycleState::Absent, state)
                .with_status(snapshot.status),
        );

        Ok(handle)
    }

    // ── Versioning and activation ─────────────────────────────────────────────

    /// Mint a new immutable version from the resource's working draft.
    pub fn cut_version(
        &self,
        handle: &mut ResourceHandle,
        description: Option<&str>,
    ) -> GuardrailResult<VersionHandle> {
        let from = handle.state;
        let to = self.advance(from, LifecycleEvent::VersionRequested, "cut a version of")?;

        let token = Uuid::new_v4().to_string();
        let response = self
            .policies
            .create_version(&CreateVersionRequest {
                id: handle.id.clone(),
                client_request_token: token.clone(),
                description: description.map(str::to_string),
            })
            .map_err(|e| remote_failure("create_version", e))?;

        handle.state = to;
        info!(
            resource_id = %handle.id,
            version = %response.version,
            "policy version created"
        );

        self.audit(
            LifecycleRecord::new(&handle.id, LifecycleOperation::CutVersion, from, to)
                .with_version(response.version)
                .with_token(token.clone()),
        );

        Ok(VersionHandle {
            resource_id: handle.id.clone(),
            version: response.version,
            request_token: token,
        })
    }

    /// Point the resource at `version`.
    ///
    /// The update API replaces the whole configuration, so this reads the
    /// current snapshot and writes it back with only the version changed.
    /// The read and the write are not atomic: the write names the snapshot's
    /// revision and a concurrent edit in between comes back as `Conflict`.
    pub fn activate(
        &self,
        handle: &mut ResourceHandle,
        version: VersionNumber,
    ) -> GuardrailResult<ActivationOutcome> {
        let from = handle.state;
        let to = self.advance(from, LifecycleEvent::ActivationRequested, "activate")?;

        let snapshot = self.read(&handle.id)?;
        if snapshot.version(version).is_none() {
            warn!(resource_id = %handle.id, version = %version, "version does not exist");
            return Err(GuardrailError::NotFound(RemoteDiagnostics {
                code: "VersionNotFound".to_string(),
                message: format!("resource '{}' has no version {}", handle.id, version),
                request_id: None,
            }));
        }

        if !snapshot.document.tags.is_empty() {
            warn!(
                resource_id = %handle.id,
                fields = ?UNCARRIED_FIELDS,
                "activation does not carry these fields; the service applies its own values"
            );
        }

        let token = Uuid::new_v4().to_string();
        let request = carry_forward(&snapshot, version, token.clone());

        let response = self.policies.update(&request).map_err(|e| {
            let err = remote_failure("update", e);
            if let GuardrailError::Conflict(d) = &err {
                warn!(
                    resource_id = %handle.id,
                    expected_revision = snapshot.revision,
                    code = %d.code,
                    "resource changed between read and write"
                );
            }
            err
        })?;

        handle.state = to;
        handle.last_status = Some(response.status);
        handle.active_version = Some(version);

        info!(
            resource_id = %handle.id,
            version = %version,
            status = %response.status,
            "activation submitted"
        );

        self.audit(
            LifecycleRecord::new(&handle.id, LifecycleOperation::Activate, from, to)
                .with_status(response.status)
                .with_version(version)
                .with_token(token),
        );

        Ok(ActivationOutcome {
            version,
            status: response.status,
            carried_fields: CARRIED_FIELDS.iter().map(|f| f.to_string()).collect(),
            uncarried_fields: UNCARRIED_FIELDS.iter().map(|f| f.to_string()).collect(),
        })
    }

    // ── Polling ───────────────────────────────────────────────────────────────

    /// Read the resource status until it is terminal or the bounds run out.
    ///
    /// READY and ACTIVE are success, FAILED and ERROR are failure; both are
    /// returned as `Ok`. Running out of attempts or passing the deadline is
    /// `Timeout`, firing the token is `Cancelled`. Neither touches the remote
    /// resource, so the caller may poll again.
    pub fn poll_until_terminal(
        &self,
        handle: &mut ResourceHandle,
        options: &PollOptions,
    ) -> GuardrailResult<TerminalStatus> {
        if options.max_attempts == 0 {
            return Err(GuardrailError::Config {
                reason: "poll max_attempts must be at least 1".to_string(),
            });
        }

        let cancel = options.cancel.as_ref();
        for attempt in 1..=options.max_attempts {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.cancelled(handle, attempt - 1));
            }
            if options.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.timed_out(handle, attempt - 1));
            }

            let snapshot = self.read_until(&handle.id, options.deadline)?;
            let status = snapshot.status;
            handle.last_status = Some(status);
            debug!(
                resource_id = %handle.id,
                attempt,
                max_attempts = options.max_attempts,
                status = %status,
                "polled resource status"
            );

            if status.is_terminal() {
                return Ok(self.settle(handle, &snapshot));
            }

            if attempt < options.max_attempts {
                let wait = options
                    .deadline
                    .map_or(options.interval, |d| options.interval.min(remaining(d)));
                if !self.sleeper.sleep(wait, cancel) {
                    return Err(self.cancelled(handle, attempt));
                }
            }
        }

        Err(self.timed_out(handle, options.max_attempts))
    }

    /// Bring the resource to an active version.
    ///
    /// If it is already ACTIVE on the requested version (or on any version
    /// when none is requested), nothing happens. Otherwise the requested
    /// version is activated; without one, the newest existing version is
    /// used, or a new one is cut when none exist. Polling then runs until a
    /// terminal status.
    pub fn deploy(
        &self,
        handle: &mut ResourceHandle,
        version: Option<VersionNumber>,
        options: &PollOptions,
    ) -> GuardrailResult<DeployOutcome> {
        let snapshot = self.read(&handle.id)?;
        handle.last_status = Some(snapshot.status);
        if snapshot.status.is_terminal() {
            self.apply_terminal(handle, snapshot.status);
        }

        let already_serving = snapshot.status == ResourceStatus::Active
            && version.map_or(true, |v| snapshot.current_version == Some(v));
        if already_serving {
            info!(
                resource_id = %handle.id,
                version = ?snapshot.current_version,
                "resource already active; no deployment needed"
            );
            return Ok(DeployOutcome::AlreadyActive { version: snapshot.current_version });
        }

        let target = match version.or_else(|| snapshot.latest_version().map(|v| v.version)) {
            Some(v) => v,
            None => {
                info!(resource_id = %handle.id, "no versions exist; cutting one");
                self.cut_version(handle, Some(AUTO_VERSION_DESCRIPTION))?.version
            }
        };

        let activation = self.activate(handle, target)?;
        let status = self.poll_until_terminal(handle, options)?;

        Ok(DeployOutcome::Activated { version: target, activation, status })
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Full snapshot of one resource.
    pub fn describe(&self, id: &str) -> GuardrailResult<ResourceSnapshot> {
        self.read(id)
    }

    /// List resources with each one's newest version.
    ///
    /// `max_results` is clamped to what the service accepts. Entries without
    /// an id are skipped.
    pub fn list(&self, max_results: u32) -> GuardrailResult<Vec<ResourceListing>> {
        let page = max_results.clamp(1, MAX_LIST_RESULTS);
        let summaries = self.with_read_retry("list", None, || self.policies.list(page))?;

        let mut listings = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if summary.id.is_empty() {
                warn!(name = %summary.name, "skipping list entry without an id");
                continue;
            }
            let latest_version = match self.read(&summary.id) {
                Ok(snapshot) => snapshot.latest_version().cloned(),
                Err(e) => {
                    warn!(resource_id = %summary.id, error = %e, "could not resolve versions");
                    None
                }
            };
            listings.push(ResourceListing { summary, latest_version });
        }

        debug!(count = listings.len(), page, "listed policy resources");
        Ok(listings)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn advance(
        &self,
        from: LifecycleState,
        event: LifecycleEvent,
        operation: &'static str,
    ) -> GuardrailResult<LifecycleState> {
        from.next(event).ok_or_else(|| {
            warn!(state = %from, event = %event, "illegal lifecycle transition");
            GuardrailError::InvalidTransition { from, operation }
        })
    }

    fn check_key(&self, key_ref: &str) -> GuardrailResult<KeyMetadata> {
        let metadata = self.keys.describe_key(key_ref).map_err(|e| {
            warn!(key_ref, error = %e, "encryption key could not be described");
            GuardrailError::KeyUnavailable {
                key_ref: key_ref.to_string(),
                reason: "key could not be described".to_string(),
                diagnostics: Some(e.diagnostics),
            }
        })?;

        if metadata.state != KeyState::Enabled {
            warn!(key_ref, state = %metadata.state, "encryption key is not enabled");
            return Err(GuardrailError::KeyUnavailable {
                key_ref: key_ref.to_string(),
                reason: format!("key state is {}", metadata.state),
                diagnostics: None,
            });
        }
        Ok(metadata)
    }

    fn read(&self, id: &str) -> GuardrailResult<ResourceSnapshot> {
        self.read_until(id, None)
    }

    fn read_until(&self, id: &str, deadline: Option<Instant>) -> GuardrailResult<ResourceSnapshot> {
        self.with_read_retry("get", deadline, || self.policies.get(id))
    }

    /// Run an idempotent read, retrying transient failures with a fixed backoff.
    ///
    /// With a deadline, the backoff is cut to the time left and no retry
    /// starts once it has passed.
    fn with_read_retry<T>(
        &self,
        operation: &'static str,
        deadline: Option<Instant>,
        mut call: impl FnMut() -> Result<T, RemoteError>,
    ) -> GuardrailResult<T> {
        let retry = self.config.read_retry;
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.kind.is_transient() && attempt < retry.max_attempts => {
                    let backoff = match deadline {
                        Some(d) if remaining(d).is_zero() => {
                            return Err(remote_failure(operation, e));
                        }
                        Some(d) => retry.backoff().min(remaining(d)),
                        None => retry.backoff(),
                    };
                    warn!(operation, attempt, error = %e, "transient read failure; retrying");
                    self.sleeper.sleep(backoff, None);
                    attempt += 1;
                }
                Err(e) => return Err(remote_failure(operation, e)),
            }
        }
    }

    /// Move the handle to the local state matching a terminal remote status.
    fn apply_terminal(&self, handle: &mut ResourceHandle, status: ResourceStatus) -> LifecycleState {
        let event = if status.is_success() {
            LifecycleEvent::ProvisioningSucceeded
        } else {
            LifecycleEvent::ProvisioningFailed
        };
        handle.state = handle
            .state
            .next(event)
            .unwrap_or_else(|| LifecycleState::from_remote(status));
        handle.state
    }

    /// Apply a terminal status to the handle, record it, and report it.
    fn settle(&self, handle: &mut ResourceHandle, snapshot: &ResourceSnapshot) -> TerminalStatus {
        let status = snapshot.status;
        let from = handle.state;
        let to = self.apply_terminal(handle, status);

        let reasons = snapshot.failure_reasons.clone();
        let terminal = match status {
            ResourceStatus::Active => TerminalStatus::Active,
            ResourceStatus::Ready => TerminalStatus::Ready,
            ResourceStatus::Error => TerminalStatus::Error { reasons },
            _ => TerminalStatus::Failed { reasons },
        };

        if terminal.is_success() {
            info!(resource_id = %handle.id, status = %status, "resource reached terminal status");
        } else {
            warn!(
                resource_id = %handle.id,
                status = %status,
                reasons = ?snapshot.failure_reasons,
                "resource provisioning failed"
            );
        }

        let mut record = LifecycleRecord::new(&handle.id, LifecycleOperation::Poll, from, to)
            .with_status(status);
        if !snapshot.failure_reasons.is_empty() {
            record = record.with_detail(snapshot.failure_reasons.join("; "));
        }
        self.audit(record);

        terminal
    }

    fn timed_out(&self, handle: &ResourceHandle, attempts: u32) -> GuardrailError {
        warn!(
            resource_id = %handle.id,
            attempts,
            last_status = ?handle.last_status,
            "resource did not reach a terminal status in time"
        );
        let mut record =
            LifecycleRecord::new(&handle.id, LifecycleOperation::Poll, handle.state, handle.state)
                .with_detail(format!("timed out after {attempts} poll(s)"));
        if let Some(status) = handle.last_status {
            record = record.with_status(status);
        }
        self.audit(record);

        GuardrailError::Timeout {
            resource_id: handle.id.clone(),
            attempts,
            last_status: handle.last_status,
        }
    }

    fn cancelled(&self, handle: &ResourceHandle, attempts: u32) -> GuardrailError {
        info!(resource_id = %handle.id, attempts, "polling cancelled");
        GuardrailError::Cancelled {
            resource_id: handle.id.clone(),
            attempts,
        }
    }

    fn audit(&self, record: LifecycleRecord) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.write(&record) {
                warn!(
                    resource_id = %record.resource_id,
                    operation = %record.operation,
                    error = %e,
                    "failed to write lifecycle record"
                );
            }
        }
    }
}

/// Time left before `deadline`, zero once it has passed.
fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Log and map a remote error.
fn remote_failure(operation: &'static str, err: RemoteError) -> GuardrailError {
    warn!(
        operation,
        kind = %err.kind,
        code = %err.diagnostics.code,
        request_id = ?err.diagnostics.request_id,
        "remote call failed"
    );
    err.into()
}

/// Copy every carried field of `snapshot` into an update that changes only
/// the version pointer.
fn carry_forward(snapshot: &ResourceSnapshot, version: VersionNumber, token: String) -> UpdateRequest {
    let doc = &snapshot.document;
    UpdateRequest {
        id: snapshot.id.clone(),
        version,
        client_request_token: token,
        expected_revision: snapshot.revision,
        name: doc.name.clone(),
        description: doc.description.clone(),
        blocked_input_messaging: doc.blocked_input_messaging.clone(),
        blocked_outputs_messaging: doc.blocked_outputs_messaging.clone(),
        kms_key_id: doc.kms_key_id.clone(),
        content_policy: doc.content_policy.clone(),
        word_policy: doc.word_policy.clone(),
        topic_policy: doc.topic_policy.clone(),
        sensitive_information_policy: doc.sensitive_information_policy.clone(),
        contextual_grounding_policy: doc.contextual_grounding_policy.clone(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::{Duration as ChronoDuration, Utc};

    use guardrail_contracts::{
        config::RetrySettings,
        document::PolicyDocument,
        error::ErrorKind,
        remote::{
            CreateResponse, CreateVersionResponse, DecryptOutput, EncryptOutput,
            EncryptionContext, RemoteErrorKind, UpdateResponse, VersionStatus,
        },
    };
    use guardrail_policy::{
        Catalog, CompilerOptions, ConfigValidator, PolicyCompiler, PolicyOverrides,
        ValidationOptions,
    };

    use super::*;

    // ── Mock collaborators ────────────────────────────────────────────────────

    #[derive(Default)]
    struct ServiceState {
        /// Statuses returned by successive `get` calls; the last one repeats.
        statuses: VecDeque<ResourceStatus>,
        versions: Vec<PolicyVersion>,
        document: Option<PolicyDocument>,
        revision: u64,
        get_calls: u32,
        /// Transient errors returned before `get` succeeds.
        throttled_gets: u32,
        creates: Vec<CreateRequest>,
        version_requests: Vec<CreateVersionRequest>,
        updates: Vec<UpdateRequest>,
        create_error: Option<RemoteError>,
        /// Bump the revision after the next `get`, as if another client wrote.
        concurrent_edit: bool,
        listing: Vec<ResourceSummary>,
        failure_reasons: Vec<String>,
    }

    /// A policy service that replays a scripted status sequence.
    #[derive(Clone, Default)]
    struct ScriptedService {
        state: Arc<Mutex<ServiceState>>,
    }

    impl ScriptedService {
        fn with_statuses(statuses: &[ResourceStatus]) -> Self {
            let service = Self::default();
            service.state.lock().unwrap().statuses = statuses.iter().copied().collect();
            service
        }

        fn add_version(&self, number: u32, age_minutes: i64) {
            self.state.lock().unwrap().versions.push(PolicyVersion {
                version: VersionNumber(number),
                status: VersionStatus::Draft,
                description: None,
                created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
            });
        }

        fn get_calls(&self) -> u32 {
            self.state.lock().unwrap().get_calls
        }
    }

    impl PolicyService for ScriptedService {
        fn create(&self, request: &CreateRequest) -> Result<CreateResponse, RemoteError> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.create_error.clone() {
                return Err(err);
            }
            state.creates.push(request.clone());
            state.document = Some(request.document.clone());
            Ok(CreateResponse {
                id: "gr-001".to_string(),
                arn: "arn:aws:bedrock:us-east-1:111122223333:guardrail/gr-001".to_string(),
            })
        }

        fn get(&self, id: &str) -> Result<ResourceSnapshot, RemoteError> {
            let mut state = self.state.lock().unwrap();
            state.get_calls += 1;
            if state.throttled_gets > 0 {
                state.throttled_gets -= 1;
                return Err(RemoteError::new(
                    RemoteErrorKind::Throttling,
                    "ThrottlingException",
                    "Rate exceeded",
                ));
            }
            let status = if state.statuses.len() > 1 {
                state.statuses.pop_front().unwrap()
            } else {
                state.statuses.front().copied().unwrap_or(ResourceStatus::Ready)
            };
            let snapshot = ResourceSnapshot {
                id: id.to_string(),
                arn: format!("arn:aws:bedrock:us-east-1:111122223333:guardrail/{id}"),
                status,
                current_version: None,
                versions: state.versions.clone(),
                document: state.document.clone().unwrap_or_else(test_document),
                failure_reasons: state.failure_reasons.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                revision: state.revision,
            };
            if state.concurrent_edit {
                state.concurrent_edit = false;
                state.revision += 1;
            }
            Ok(snapshot)
        }

        fn create_version(
            &self,
            request: &CreateVersionRequest,
        ) -> Result<CreateVersionResponse, RemoteError> {
            let mut state = self.state.lock().unwrap();
            state.version_requests.push(request.clone());
            let next = VersionNumber(state.versions.len() as u32 + 1);
            state.versions.push(PolicyVersion {
                version: next,
                status: VersionStatus::Draft,
                description: request.description.clone(),
                created_at: Utc::now(),
            });
            Ok(CreateVersionResponse { version: next })
        }

        fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, RemoteError> {
            let mut state = self.state.lock().unwrap();
            if request.expected_revision != state.revision {
                return Err(RemoteError::new(
                    RemoteErrorKind::Conflict,
                    "ConflictException",
                    "The resource was modified by another request",
                )
                .with_request_id("req-conflict"));
            }
            state.revision += 1;
            state.updates.push(request.clone());
            Ok(UpdateResponse { status: ResourceStatus::Updating })
        }

        fn list(&self, _max_results: u32) -> Result<Vec<ResourceSummary>, RemoteError> {
            Ok(self.state.lock().unwrap().listing.clone())
        }
    }

    /// A key service that reports a fixed state.
    struct MockKeys {
        state: Option<KeyState>,
    }

    impl KeyService for MockKeys {
        fn describe_key(&self, key_ref: &str) -> Result<KeyMetadata, RemoteError> {
            match self.state {
                Some(state) => Ok(KeyMetadata {
                    key_id: "1234abcd-12ab-34cd-56ef-1234567890ab".to_string(),
                    arn: format!("arn:aws:kms:us-east-1:111122223333:{key_ref}"),
                    state,
                }),
                None => Err(RemoteError::new(
                    RemoteErrorKind::NotFound,
                    "NotFoundException",
                    format!("Alias {key_ref} is not found."),
                )),
            }
        }

        fn encrypt(
            &self,
            _key_ref: &str,
            _plaintext: &[u8],
            _context: &EncryptionContext,
        ) -> Result<EncryptOutput, RemoteError> {
            unreachable!("reconciler never encrypts")
        }

        fn decrypt(
            &self,
            _ciphertext: &[u8],
            _context: &EncryptionContext,
        ) -> Result<DecryptOutput, RemoteError> {
            unreachable!("reconciler never decrypts")
        }
    }

    /// A sleeper that returns immediately and counts calls.
    #[derive(Clone, Default)]
    struct CountingSleeper {
        sleeps: Arc<Mutex<u32>>,
        /// Every requested duration, in order.
        waits: Arc<Mutex<Vec<Duration>>>,
        /// Cancel this token on the nth sleep.
        cancel_on: Option<(u32, CancellationToken)>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, duration: Duration, cancel: Option<&CancellationToken>) -> bool {
            self.waits.lock().unwrap().push(duration);
            let mut sleeps = self.sleeps.lock().unwrap();
            *sleeps += 1;
            if let Some((n, token)) = &self.cancel_on {
                if *sleeps == *n {
                    token.cancel();
                }
            }
            !cancel.is_some_and(CancellationToken::is_cancelled)
        }
    }

    #[derive(Clone, Default)]
    struct MockAudit {
        records: Arc<Mutex<Vec<LifecycleRecord>>>,
    }

    impl AuditWriter for MockAudit {
        fn write(&self, record: &LifecycleRecord) -> GuardrailResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn test_document() -> PolicyDocument {
        PolicyCompiler::new(Catalog::banking(), CompilerOptions::default())
            .compile(&PolicyOverrides::default().with_kms_key("alias/bedrock-guardrail-key"))
            .unwrap()
    }

    fn validated() -> ValidatedDocument {
        ConfigValidator::new(ValidationOptions { require_encryption_key: true })
            .approve(test_document())
            .unwrap()
    }

    fn reconciler(
        service: &ScriptedService,
        sleeper: &CountingSleeper,
        audit: &MockAudit,
    ) -> Reconciler {
        Reconciler::new(
            Box::new(service.clone()),
            Box::new(MockKeys { state: Some(KeyState::Enabled) }),
            GuardrailConfig::default(),
        )
        .with_sleeper(Box::new(sleeper.clone()))
        .with_audit(Box::new(audit.clone()))
    }

    fn handle(state: LifecycleState) -> ResourceHandle {
        ResourceHandle {
            id: "gr-001".to_string(),
            arn: "arn:aws:bedrock:us-east-1:111122223333:guardrail/gr-001".to_string(),
            name: "BankingVoiceBotGuardrail".to_string(),
            state,
            last_status: None,
            active_version: None,
        }
    }

    fn poll(max_attempts: u32) -> PollOptions {
        PollOptions {
            max_attempts,
            interval: Duration::from_secs(5),
            deadline: None,
            cancel: None,
        }
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    #[test]
    fn test_create_submits_with_unique_token() {
        let service = ScriptedService::default();
        let audit = MockAudit::default();
        let r = reconciler(&service, &CountingSleeper::default(), &audit);

        let first = r.create(&validated()).unwrap();
        let second = r.create(&validated()).unwrap();

        assert_eq!(first.state, LifecycleState::Creating);
        assert_eq!(first.id, "gr-001");
        let state = service.state.lock().unwrap();
        assert_eq!(state.creates.len(), 2);
        assert_ne!(
            state.creates[0].client_request_token,
            state.creates[1].client_request_token
        );
        drop(state);
        assert_eq!(second.last_status, Some(ResourceStatus::Creating));

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation, LifecycleOperation::Create);
        assert_eq!(records[0].from, LifecycleState::Absent);
        assert_eq!(records[0].to, LifecycleState::Creating);
    }

    /// Remote validation errors pass through with the original diagnostics.
    #[test]
    fn test_create_remote_rejection_keeps_diagnostics() {
        let service = ScriptedService::default();
        service.state.lock().unwrap().create_error = Some(
            RemoteError::new(
                RemoteErrorKind::Validation,
                "ValidationException",
                "1 validation error detected: Value at 'name' failed to satisfy constraint",
            )
            .with_request_id("req-42"),
        );
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());

        match r.create(&validated()) {
            Err(GuardrailError::RemoteRejected(d)) => {
                assert_eq!(d.code, "ValidationException");
                assert!(d.message.contains("failed to satisfy constraint"));
                assert_eq!(d.request_id.as_deref(), Some("req-42"));
            }
            other => panic!("expected RemoteRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_disabled_key() {
        let service = ScriptedService::default();
        let r = Reconciler::new(
            Box::new(service.clone()),
            Box::new(MockKeys { state: Some(KeyState::Disabled) }),
            GuardrailConfig::default(),
        );

        match r.create(&validated()) {
            Err(GuardrailError::KeyUnavailable { key_ref, reason, .. }) => {
                assert_eq!(key_ref, "alias/bedrock-guardrail-key");
                assert!(reason.contains("Disabled"));
            }
            other => panic!("expected KeyUnavailable, got {:?}", other),
        }
        assert!(service.state.lock().unwrap().creates.is_empty());
    }

    #[test]
    fn test_create_rejects_unknown_key() {
        let r = Reconciler::new(
            Box::new(ScriptedService::default()),
            Box::new(MockKeys { state: None }),
            GuardrailConfig::default(),
        );

        let err = r.create(&validated()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyUnavailable);
        assert_eq!(err.diagnostics().unwrap().code, "NotFoundException");
    }

    // ── Polling ───────────────────────────────────────────────────────────────

    #[test]
    fn test_poll_reaches_active_after_three_reads() {
        use ResourceStatus::*;
        let service = ScriptedService::with_statuses(&[Creating, Creating, Active]);
        let sleeper = CountingSleeper::default();
        let r = reconciler(&service, &sleeper, &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        let status = r.poll_until_terminal(&mut h, &poll(5)).unwrap();

        assert_eq!(status, TerminalStatus::Active);
        assert_eq!(service.get_calls(), 3);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), 2);
        assert_eq!(h.state, LifecycleState::Active);
    }

    /// Exhausting attempts is a Timeout after exactly max_attempts reads,
    /// with no sleep after the last one.
    #[test]
    fn test_poll_times_out_after_max_attempts() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Creating; 10]);
        let sleeper = CountingSleeper::default();
        let audit = MockAudit::default();
        let r = reconciler(&service, &sleeper, &audit);
        let mut h = handle(LifecycleState::Creating);

        let err = r.poll_until_terminal(&mut h, &poll(5)).unwrap_err();
        assert!(err.is_recoverable());
        match err {
            GuardrailError::Timeout { attempts, last_status, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(last_status, Some(ResourceStatus::Creating));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(service.get_calls(), 5);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), 4);
        assert_eq!(h.state, LifecycleState::Creating);
        assert_eq!(audit.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_poll_reports_failure_reasons() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Failed]);
        service.state.lock().unwrap().failure_reasons =
            vec!["KMS key access denied".to_string()];
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        let status = r.poll_until_terminal(&mut h, &poll(3)).unwrap();
        assert_eq!(
            status,
            TerminalStatus::Failed { reasons: vec!["KMS key access denied".to_string()] }
        );
        assert!(!status.is_success());
        assert_eq!(h.state, LifecycleState::Failed);
    }

    #[test]
    fn test_poll_treats_ready_as_success() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Ready]);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        assert_eq!(r.poll_until_terminal(&mut h, &poll(3)).unwrap(), TerminalStatus::Ready);
        assert_eq!(h.state, LifecycleState::Active);
    }

    #[test]
    fn test_poll_zero_attempts_is_config_error() {
        let service = ScriptedService::default();
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        let err = r.poll_until_terminal(&mut h, &poll(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(service.get_calls(), 0);
    }

    #[test]
    fn test_poll_cancelled_while_sleeping() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Creating]);
        let token = CancellationToken::new();
        let sleeper = CountingSleeper {
            cancel_on: Some((2, token.clone())),
            ..CountingSleeper::default()
        };
        let r = reconciler(&service, &sleeper, &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        match r.poll_until_terminal(&mut h, &poll(10).with_cancel(token)) {
            Err(GuardrailError::Cancelled { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected Cancelled, got {:?}", other),
        }
        assert_eq!(service.get_calls(), 2);
    }

    #[test]
    fn test_poll_past_deadline_times_out_without_reading() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Creating]);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        let options = poll(10).with_deadline(Instant::now());
        match r.poll_until_terminal(&mut h, &options) {
            Err(GuardrailError::Timeout { attempts, .. }) => assert_eq!(attempts, 0),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(service.get_calls(), 0);
    }

    /// Waits between reads never run past the deadline.
    #[test]
    fn test_poll_waits_are_clamped_to_deadline() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Creating]);
        let sleeper = CountingSleeper::default();
        let r = reconciler(&service, &sleeper, &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        let budget = Duration::from_millis(50);
        let options = poll(3).with_deadline(Instant::now() + budget);
        let _ = r.poll_until_terminal(&mut h, &options);

        let waits = sleeper.waits.lock().unwrap();
        assert!(!waits.is_empty());
        assert!(waits.iter().all(|w| *w <= budget), "waits: {:?}", waits);
    }

    /// A deadline shorter than the interval ends the poll in deadline time,
    /// not interval time.
    #[test]
    fn test_poll_deadline_cuts_interval_short() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Creating]);
        let r = Reconciler::new(
            Box::new(service.clone()),
            Box::new(MockKeys { state: Some(KeyState::Enabled) }),
            GuardrailConfig::default(),
        )
        .with_sleeper(Box::new(ThreadSleeper::new(Duration::from_millis(1))));
        let mut h = handle(LifecycleState::Creating);

        let options = PollOptions {
            interval: Duration::from_secs(2),
            ..poll(3).with_deadline(Instant::now() + Duration::from_millis(50))
        };
        let started = Instant::now();
        match r.poll_until_terminal(&mut h, &options) {
            Err(GuardrailError::Timeout { attempts, last_status, .. }) => {
                assert_eq!(attempts, 1);
                assert_eq!(last_status, Some(ResourceStatus::Creating));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert_eq!(service.get_calls(), 1);
    }

    /// Read retries inside a poll stop at the deadline instead of spending
    /// the full backoff.
    #[test]
    fn test_read_retry_respects_poll_deadline() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Active]);
        service.state.lock().unwrap().throttled_gets = 100;
        let config = GuardrailConfig {
            read_retry: RetrySettings { max_attempts: 5, backoff_ms: 2_000 },
            ..GuardrailConfig::default()
        };
        let r = Reconciler::new(
            Box::new(service.clone()),
            Box::new(MockKeys { state: Some(KeyState::Enabled) }),
            config,
        )
        .with_sleeper(Box::new(ThreadSleeper::new(Duration::from_millis(1))));
        let mut h = handle(LifecycleState::Creating);

        let options = poll(3).with_deadline(Instant::now() + Duration::from_millis(50));
        let started = Instant::now();
        let err = r.poll_until_terminal(&mut h, &options).unwrap_err();

        assert_eq!(err.diagnostics().unwrap().code, "ThrottlingException");
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        assert_eq!(service.get_calls(), 2);
    }

    /// Throttled reads are retried transparently.
    #[test]
    fn test_throttled_reads_are_retried() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Active]);
        service.state.lock().unwrap().throttled_gets = 2;
        let sleeper = CountingSleeper::default();
        let r = reconciler(&service, &sleeper, &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        assert_eq!(r.poll_until_terminal(&mut h, &poll(1)).unwrap(), TerminalStatus::Active);
        assert_eq!(service.get_calls(), 3);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), 2);
    }

    #[test]
    fn test_read_retry_gives_up() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Active]);
        service.state.lock().unwrap().throttled_gets = 100;
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());

        let err = r.describe("gr-001").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.diagnostics().unwrap().code, "ThrottlingException");
        assert_eq!(service.get_calls(), GuardrailConfig::default().read_retry.max_attempts);
    }

    // ── Versioning and activation ─────────────────────────────────────────────

    #[test]
    fn test_cut_version_requires_active_resource() {
        let service = ScriptedService::default();
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        match r.cut_version(&mut h, None) {
            Err(GuardrailError::InvalidTransition { from, .. }) => {
                assert_eq!(from, LifecycleState::Creating);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        assert!(service.state.lock().unwrap().version_requests.is_empty());
    }

    #[test]
    fn test_cut_version_uses_fresh_tokens() {
        let service = ScriptedService::default();
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Active);

        let v1 = r.cut_version(&mut h, Some("first")).unwrap();
        let v2 = r.cut_version(&mut h, None).unwrap();

        assert_eq!(v1.version, VersionNumber(1));
        assert_eq!(v2.version, VersionNumber(2));
        assert_ne!(v1.request_token, v2.request_token);
        assert_eq!(h.state, LifecycleState::Versioning);
    }

    /// Activation writes back the snapshot unchanged except for the version.
    #[test]
    fn test_activate_carries_configuration_forward() {
        let service = ScriptedService::default();
        service.add_version(1, 0);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Active);

        let outcome = r.activate(&mut h, VersionNumber(1)).unwrap();

        assert_eq!(outcome.version, VersionNumber(1));
        assert_eq!(outcome.status, ResourceStatus::Updating);
        assert!(outcome.carried_fields.contains(&"topicPolicy".to_string()));
        assert_eq!(outcome.uncarried_fields, vec!["tags".to_string()]);
        assert_eq!(h.state, LifecycleState::Versioning);
        assert_eq!(h.active_version, Some(VersionNumber(1)));

        let state = service.state.lock().unwrap();
        let update = &state.updates[0];
        let doc = test_document();
        assert_eq!(update.version, VersionNumber(1));
        assert_eq!(update.name, doc.name);
        assert_eq!(update.blocked_input_messaging, doc.blocked_input_messaging);
        assert_eq!(update.kms_key_id, doc.kms_key_id);
        assert_eq!(update.topic_policy, doc.topic_policy);
        assert_eq!(update.contextual_grounding_policy, doc.contextual_grounding_policy);
    }

    /// A write by another client between our read and write is a Conflict.
    #[test]
    fn test_activate_conflict_on_concurrent_edit() {
        let service = ScriptedService::default();
        service.add_version(1, 0);
        service.state.lock().unwrap().concurrent_edit = true;
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Active);

        match r.activate(&mut h, VersionNumber(1)) {
            Err(GuardrailError::Conflict(d)) => {
                assert_eq!(d.code, "ConflictException");
                assert_eq!(d.request_id.as_deref(), Some("req-conflict"));
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
        assert_eq!(h.state, LifecycleState::Active);
        assert!(service.state.lock().unwrap().updates.is_empty());
    }

    #[test]
    fn test_activate_unknown_version_is_not_found() {
        let service = ScriptedService::default();
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Active);

        let err = r.activate(&mut h, VersionNumber(9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.diagnostics().unwrap().code, "VersionNotFound");
    }

    // ── Deploy ────────────────────────────────────────────────────────────────

    #[test]
    fn test_deploy_noop_when_already_active() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Active]);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Active);

        let outcome = r.deploy(&mut h, None, &poll(3)).unwrap();
        assert_eq!(outcome, DeployOutcome::AlreadyActive { version: None });
        assert!(service.state.lock().unwrap().updates.is_empty());
    }

    #[test]
    fn test_deploy_picks_newest_version_by_creation_time() {
        use ResourceStatus::*;
        let service = ScriptedService::with_statuses(&[Ready, Updating, Active]);
        service.add_version(1, 5);
        service.add_version(2, 60);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());
        let mut h = handle(LifecycleState::Creating);

        match r.deploy(&mut h, None, &poll(5)).unwrap() {
            DeployOutcome::Activated { version, status, .. } => {
                assert_eq!(version, VersionNumber(1));
                assert_eq!(status, TerminalStatus::Active);
            }
            other => panic!("expected Activated, got {:?}", other),
        }
        assert_eq!(h.state, LifecycleState::Active);
    }

    #[test]
    fn test_deploy_cuts_version_when_none_exist() {
        use ResourceStatus::*;
        let service = ScriptedService::with_statuses(&[Ready, Active]);
        let audit = MockAudit::default();
        let r = reconciler(&service, &CountingSleeper::default(), &audit);
        let mut h = handle(LifecycleState::Creating);

        match r.deploy(&mut h, None, &poll(5)).unwrap() {
            DeployOutcome::Activated { version, .. } => assert_eq!(version, VersionNumber(1)),
            other => panic!("expected Activated, got {:?}", other),
        }

        let operations: Vec<LifecycleOperation> =
            audit.records.lock().unwrap().iter().map(|r| r.operation).collect();
        assert_eq!(
            operations,
            vec![
                LifecycleOperation::CutVersion,
                LifecycleOperation::Activate,
                LifecycleOperation::Poll,
            ]
        );
    }

    /// The status check at the start of a deploy moves the handle but is not
    /// a poll loop, so it writes no record.
    #[test]
    fn test_deploy_status_check_writes_no_record() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Active]);
        let audit = MockAudit::default();
        let r = reconciler(&service, &CountingSleeper::default(), &audit);
        let mut h = handle(LifecycleState::Creating);

        let outcome = r.deploy(&mut h, None, &poll(3)).unwrap();
        assert_eq!(outcome, DeployOutcome::AlreadyActive { version: None });
        assert_eq!(h.state, LifecycleState::Active);
        assert!(audit.records.lock().unwrap().is_empty());
    }

    /// FAILED is final: neither activate nor deploy moves a failed resource.
    #[test]
    fn test_failed_resource_cannot_be_reactivated() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Failed]);
        service.add_version(1, 5);
        let audit = MockAudit::default();
        let r = reconciler(&service, &CountingSleeper::default(), &audit);
        let mut h = handle(LifecycleState::Failed);

        match r.activate(&mut h, VersionNumber(1)) {
            Err(GuardrailError::InvalidTransition { from, .. }) => {
                assert_eq!(from, LifecycleState::Failed)
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        match r.deploy(&mut h, None, &poll(3)) {
            Err(GuardrailError::InvalidTransition { from, .. }) => {
                assert_eq!(from, LifecycleState::Failed)
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
        assert!(service.state.lock().unwrap().updates.is_empty());
        assert!(audit.records.lock().unwrap().is_empty());
        assert_eq!(h.state, LifecycleState::Failed);
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    #[test]
    fn test_list_skips_entries_without_id() {
        let service = ScriptedService::default();
        service.add_version(1, 30);
        service.add_version(2, 1);
        service.state.lock().unwrap().listing = vec![
            ResourceSummary {
                id: "gr-001".to_string(),
                name: "BankingVoiceBotGuardrail".to_string(),
                status: ResourceStatus::Active,
                arn: String::new(),
            },
            ResourceSummary {
                id: String::new(),
                name: "orphan".to_string(),
                status: ResourceStatus::Ready,
                arn: String::new(),
            },
        ];
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());

        let listings = r.list(500).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].summary.id, "gr-001");
        assert_eq!(
            listings[0].latest_version.as_ref().map(|v| v.version),
            Some(VersionNumber(2))
        );
    }

    #[test]
    fn test_attach_derives_state_from_remote_status() {
        let service = ScriptedService::with_statuses(&[ResourceStatus::Versioning]);
        let r = reconciler(&service, &CountingSleeper::default(), &MockAudit::default());

        let h = r.attach("gr-007").unwrap();
        assert_eq!(h.id, "gr-007");
        assert_eq!(h.state, LifecycleState::Versioning);
        assert_eq!(h.name, "BankingVoiceBotGuardrail");
    }
}
