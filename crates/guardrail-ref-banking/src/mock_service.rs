//! Simulated remote policy service for the banking reference runtime.
//!
//! Behaves like the real service where the reconciler can tell the
//! difference:
//!
//! - new resources sit in CREATING for a few reads, then become READY
//! - an update sits in UPDATING for a few reads, then becomes ACTIVE
//! - every configuration write and every settle out of CREATING or UPDATING
//!   bumps the resource revision, and an update naming a stale revision is
//!   rejected with a conflict
//! - a repeated client request token returns the original result
//! - an update replaces every field it is given and resets tags
//!
//! Faults can be scripted per operation. Nothing leaves the process.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use guardrail_contracts::{
    document::PolicyDocument,
    remote::{
        CreateRequest, CreateResponse, CreateVersionRequest, CreateVersionResponse,
        PolicyVersion, RemoteError, RemoteErrorKind, ResourceSnapshot, ResourceStatus,
        ResourceSummary, UpdateRequest, UpdateResponse, VersionNumber, VersionStatus,
    },
};
use guardrail_core::traits::PolicyService;

const ACCOUNT: &str = "111122223333";

/// Remote operations a fault can be scripted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    CreateVersion,
    Update,
    List,
}

struct SimResource {
    snapshot: ResourceSnapshot,
    /// Reads left before a transitional status settles.
    ticks: u32,
    /// Status reached when `ticks` runs out.
    settles_to: ResourceStatus,
}

#[derive(Default)]
struct SimState {
    resources: BTreeMap<String, SimResource>,
    next_id: u32,
    /// Request token to the id or version it produced.
    create_tokens: HashMap<String, CreateResponse>,
    version_tokens: HashMap<String, VersionNumber>,
    faults: HashMap<Operation, VecDeque<RemoteError>>,
    /// Extra entries `list` reports, such as summaries without an id.
    phantom_listings: Vec<ResourceSummary>,
    fail_provisioning: Option<Vec<String>>,
    /// Resources another client writes to right after their next read.
    pending_edits: HashSet<String>,
    calls: HashMap<Operation, u32>,
}

/// In-memory stand-in for the remote policy service. Clones share state.
#[derive(Clone)]
pub struct MockPolicyService {
    region: String,
    /// Reads a resource spends in CREATING or UPDATING.
    provisioning_reads: u32,
    state: Arc<Mutex<SimState>>,
}

impl MockPolicyService {
    pub fn new(region: impl Into<String>, provisioning_reads: u32) -> Self {
        Self {
            region: region.into(),
            provisioning_reads,
            state: Arc::default(),
        }
    }

    /// Make the next call of `operation` fail with `error`. Faults queue up.
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.lock().faults.entry(operation).or_default().push_back(error);
    }

    /// Simulate another client writing to `id` between the next read of it
    /// and whatever write follows. The edit lands right after that read
    /// returns, so the snapshot it returned is already stale.
    pub fn inject_concurrent_edit(&self, id: &str) {
        self.lock().pending_edits.insert(id.to_string());
    }

    /// Make every later provisioning end in FAILED with `reasons`.
    pub fn fail_provisioning(&self, reasons: Vec<String>) {
        self.lock().fail_provisioning = Some(reasons);
    }

    /// Make `list` also report `summary`.
    pub fn add_listing(&self, summary: ResourceSummary) {
        self.lock().phantom_listings.push(summary);
    }

    pub fn calls(&self, operation: Operation) -> u32 {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and pop a scripted fault, if any.
    fn enter(&self, state: &mut SimState, operation: Operation) -> Result<(), RemoteError> {
        *state.calls.entry(operation).or_default() += 1;
        match state.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn begin_transition(
        &self,
        state: &SimState,
        resource: &mut SimResource,
        from: ResourceStatus,
        to: ResourceStatus,
    ) {
        resource.snapshot.status = from;
        resource.snapshot.failure_reasons.clear();
        resource.ticks = self.provisioning_reads;
        resource.settles_to = if state.fail_provisioning.is_some() {
            ResourceStatus::Failed
        } else {
            to
        };
    }
}

impl PolicyService for MockPolicyService {
    fn create(&self, request: &CreateRequest) -> Result<CreateResponse, RemoteError> {
        let mut state = self.lock();
        self.enter(&mut state, Operation::Create)?;

        if let Some(previous) = state.create_tokens.get(&request.client_request_token) {
            return Ok(previous.clone());
        }

        let document = &request.document;
        if document.name.trim().is_empty() {
            return Err(validation(
                "Value at 'name' failed to satisfy constraint: Member must have length greater than or equal to 1",
            ));
        }
        if state.resources.values().any(|r| r.snapshot.document.name == document.name) {
            return Err(RemoteError::new(
                RemoteErrorKind::Conflict,
                "ConflictException",
                format!("A guardrail named '{}' already exists", document.name),
            ));
        }

        state.next_id += 1;
        let id = format!("gr{:010}", state.next_id);
        let arn = format!("arn:aws:bedrock:{}:{ACCOUNT}:guardrail/{id}", self.region);
        let now = Utc::now();

        let mut resource = SimResource {
            snapshot: ResourceSnapshot {
                id: id.clone(),
                arn: arn.clone(),
                status: ResourceStatus::Creating,
                current_version: None,
                versions: Vec::new(),
                document: document.clone(),
                failure_reasons: Vec::new(),
                created_at: now,
                updated_at: now,
                revision: 1,
            },
            ticks: 0,
            settles_to: ResourceStatus::Ready,
        };
        self.begin_transition(
            &state,
            &mut resource,
            ResourceStatus::Creating,
            ResourceStatus::Ready,
        );
        state.resources.insert(id.clone(), resource);

        let response = CreateResponse { id, arn };
        state
            .create_tokens
            .insert(request.client_request_token.clone(), response.clone());
        debug!(resource_id = %response.id, "simulated create");
        Ok(response)
    }

    fn get(&self, id: &str) -> Result<ResourceSnapshot, RemoteError> {
        let mut state = self.lock();
        self.enter(&mut state, Operation::Get)?;
        let failure = state.fail_provisioning.clone();

        let edited = state.pending_edits.remove(id);
        let resource = state.resources.get_mut(id).ok_or_else(|| not_found(id))?;
        if !resource.snapshot.status.is_terminal() {
            if resource.ticks == 0 {
                resource.snapshot.status = resource.settles_to;
                if resource.settles_to == ResourceStatus::Failed {
                    resource.snapshot.failure_reasons = failure.unwrap_or_default();
                }
                resource.snapshot.revision += 1;
                resource.snapshot.updated_at = Utc::now();
            } else {
                resource.ticks -= 1;
            }
        }
        let snapshot = resource.snapshot.clone();
        if edited {
            resource.snapshot.revision += 1;
            resource.snapshot.updated_at = Utc::now();
            debug!(resource_id = %id, revision = resource.snapshot.revision, "concurrent edit landed");
        }
        Ok(snapshot)
    }

    fn create_version(
        &self,
        request: &CreateVersionRequest,
    ) -> Result<CreateVersionResponse, RemoteError> {
        let mut state = self.lock();
        self.enter(&mut state, Operation::CreateVersion)?;

        if let Some(version) = state.version_tokens.get(&request.client_request_token) {
            return Ok(CreateVersionResponse { version: *version });
        }

        let resource = state
            .resources
            .get_mut(&request.id)
            .ok_or_else(|| not_found(&request.id))?;
        if !resource.snapshot.status.is_terminal() {
            return Err(RemoteError::new(
                RemoteErrorKind::Conflict,
                "ConflictException",
                format!("Guardrail {} is {}", request.id, resource.snapshot.status),
            ));
        }

        let version = VersionNumber(resource.snapshot.versions.len() as u32 + 1);
        resource.snapshot.versions.push(PolicyVersion {
            version,
            status: VersionStatus::Draft,
            description: request.description.clone(),
            created_at: Utc::now(),
        });

        state
            .version_tokens
            .insert(request.client_request_token.clone(), version);
        debug!(resource_id = %request.id, version = %version, "simulated version");
        Ok(CreateVersionResponse { version })
    }

    fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, RemoteError> {
        let mut state = self.lock();
        self.enter(&mut state, Operation::Update)?;

        let mut resource = state
            .resources
            .remove(&request.id)
            .ok_or_else(|| not_found(&request.id))?;
        let outcome = apply_update(&mut resource, request);
        if outcome.is_ok() {
            self.begin_transition(
                &state,
                &mut resource,
                ResourceStatus::Updating,
                ResourceStatus::Active,
            );
        }
        state.resources.insert(request.id.clone(), resource);
        outcome?;

        debug!(resource_id = %request.id, version = %request.version, "simulated update");
        Ok(UpdateResponse { status: ResourceStatus::Updating })
    }

    fn list(&self, max_results: u32) -> Result<Vec<ResourceSummary>, RemoteError> {
        let mut state = self.lock();
        self.enter(&mut state, Operation::List)?;

        let summaries = state
            .resources
            .values()
            .map(|r| ResourceSummary {
                id: r.snapshot.id.clone(),
                name: r.snapshot.document.name.clone(),
                status: r.snapshot.status,
                arn: r.snapshot.arn.clone(),
            })
            .chain(state.phantom_listings.iter().cloned())
            .take(max_results as usize)
            .collect();
        Ok(summaries)
    }
}

fn apply_update(resource: &mut SimResource, request: &UpdateRequest) -> Result<(), RemoteError> {
    let snapshot = &mut resource.snapshot;
    if request.expected_revision != snapshot.revision {
        return Err(RemoteError::new(
            RemoteErrorKind::Conflict,
            "ConflictException",
            format!(
                "Guardrail {} was modified (revision {} expected, found {})",
                snapshot.id, request.expected_revision, snapshot.revision
            ),
        )
        .with_request_id(format!("req-{}", snapshot.revision)));
    }
    if snapshot.version(request.version).is_none() {
        return Err(RemoteError::new(
            RemoteErrorKind::NotFound,
            "ResourceNotFoundException",
            format!("Guardrail {} has no version {}", snapshot.id, request.version),
        ));
    }
    if request.blocked_input_messaging.is_empty() || request.blocked_outputs_messaging.is_empty() {
        return Err(validation("Blocked messaging must not be empty"));
    }

    // Full replacement: anything the request does not carry goes back to its default.
    snapshot.document = PolicyDocument {
        name: request.name.clone(),
        description: request.description.clone(),
        blocked_input_messaging: request.blocked_input_messaging.clone(),
        blocked_outputs_messaging: request.blocked_outputs_messaging.clone(),
        kms_key_id: request.kms_key_id.clone(),
        content_policy: request.content_policy.clone(),
        word_policy: request.word_policy.clone(),
        topic_policy: request.topic_policy.clone(),
        sensitive_information_policy: request.sensitive_information_policy.clone(),
        contextual_grounding_policy: request.contextual_grounding_policy.clone(),
        tags: BTreeMap::new(),
    };
    for v in &mut snapshot.versions {
        v.status = if v.version == request.version {
            VersionStatus::Active
        } else {
            VersionStatus::Draft
        };
    }
    snapshot.current_version = Some(request.version);
    snapshot.revision += 1;
    snapshot.updated_at = Utc::now();
    Ok(())
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::NotFound,
        "ResourceNotFoundException",
        format!("Guardrail {id} not found"),
    )
}

fn validation(message: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Validation, "ValidationException", message)
}

#[cfg(test)]
mod tests {
    use guardrail_policy::{Catalog, CompilerOptions, PolicyCompiler, PolicyOverrides};

    use super::*;

    fn document(name: &str) -> PolicyDocument {
        PolicyCompiler::new(Catalog::banking(), CompilerOptions::default())
            .compile(&PolicyOverrides::default().with_name(name))
            .unwrap()
    }

    fn create(service: &MockPolicyService, name: &str, token: &str) -> CreateResponse {
        service
            .create(&CreateRequest {
                document: document(name),
                client_request_token: token.to_string(),
            })
            .unwrap()
    }

    /// An activation of `version` carrying every field of `snapshot`.
    fn activation(snapshot: &ResourceSnapshot, version: VersionNumber, token: &str) -> UpdateRequest {
        let doc = snapshot.document.clone();
        UpdateRequest {
            id: snapshot.id.clone(),
            version,
            client_request_token: token.to_string(),
            expected_revision: snapshot.revision,
            name: doc.name,
            description: doc.description,
            blocked_input_messaging: doc.blocked_input_messaging,
            blocked_outputs_messaging: doc.blocked_outputs_messaging,
            kms_key_id: doc.kms_key_id,
            content_policy: doc.content_policy,
            word_policy: doc.word_policy,
            topic_policy: doc.topic_policy,
            sensitive_information_policy: doc.sensitive_information_policy,
            contextual_grounding_policy: doc.contextual_grounding_policy,
        }
    }

    #[test]
    fn creating_settles_to_ready() {
        let service = MockPolicyService::new("us-east-1", 2);
        let created = create(&service, "g1", "t1");

        let statuses: Vec<ResourceStatus> =
            (0..4).map(|_| service.get(&created.id).unwrap().status).collect();
        assert_eq!(
            statuses,
            vec![
                ResourceStatus::Creating,
                ResourceStatus::Creating,
                ResourceStatus::Ready,
                ResourceStatus::Ready
            ]
        );
    }

    #[test]
    fn repeated_token_is_idempotent() {
        let service = MockPolicyService::new("us-east-1", 0);
        let first = create(&service, "g1", "same-token");
        let second = create(&service, "g1", "same-token");
        assert_eq!(first, second);
        assert_eq!(service.resource_count(), 1);
    }

    #[test]
    fn duplicate_name_conflicts() {
        let service = MockPolicyService::new("us-east-1", 0);
        create(&service, "g1", "t1");
        let err = service
            .create(&CreateRequest {
                document: document("g1"),
                client_request_token: "t2".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);
    }

    #[test]
    fn stale_revision_conflicts() {
        let service = MockPolicyService::new("us-east-1", 0);
        let created = create(&service, "g1", "t1");
        assert_eq!(service.get(&created.id).unwrap().status, ResourceStatus::Ready);
        let version = service
            .create_version(&CreateVersionRequest {
                id: created.id.clone(),
                client_request_token: "v1".to_string(),
                description: None,
            })
            .unwrap()
            .version;

        service.inject_concurrent_edit(&created.id);
        let snapshot = service.get(&created.id).unwrap();
        let err = service
            .update(&activation(&snapshot, version, "u1"))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);
        assert_eq!(err.diagnostics.request_id.as_deref(), Some("req-3"));

        let fresh = service.get(&created.id).unwrap();
        assert_eq!(fresh.current_version, None);
        service.update(&activation(&fresh, version, "u2")).unwrap();
    }

    /// Settling out of CREATING is a change of its own; a snapshot read
    /// before it is stale.
    #[test]
    fn settle_bumps_revision() {
        let service = MockPolicyService::new("us-east-1", 1);
        let created = create(&service, "g1", "t1");

        let during = service.get(&created.id).unwrap();
        assert_eq!(during.status, ResourceStatus::Creating);
        let settled = service.get(&created.id).unwrap();
        assert_eq!(settled.status, ResourceStatus::Ready);
        assert_eq!(settled.revision, during.revision + 1);
        assert_eq!(service.get(&created.id).unwrap().revision, settled.revision);

        let version = service
            .create_version(&CreateVersionRequest {
                id: created.id.clone(),
                client_request_token: "v1".to_string(),
                description: None,
            })
            .unwrap()
            .version;
        let err = service
            .update(&activation(&during, version, "u1"))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Conflict);

        service.update(&activation(&settled, version, "u2")).unwrap();
    }

    #[test]
    fn scripted_faults_fire_once() {
        let service = MockPolicyService::new("us-east-1", 0);
        service.fail_next(
            Operation::List,
            RemoteError::new(RemoteErrorKind::Throttling, "ThrottlingException", "slow down"),
        );
        assert!(service.list(10).is_err());
        assert!(service.list(10).unwrap().is_empty());
        assert_eq!(service.calls(Operation::List), 2);
    }

    #[test]
    fn failed_provisioning_reports_reasons() {
        let service = MockPolicyService::new("us-east-1", 0);
        service.fail_provisioning(vec!["KMS key access denied".to_string()]);
        let created = create(&service, "g1", "t1");

        let snapshot = service.get(&created.id).unwrap();
        assert_eq!(snapshot.status, ResourceStatus::Failed);
        assert_eq!(snapshot.failure_reasons, vec!["KMS key access denied".to_string()]);
    }
}
