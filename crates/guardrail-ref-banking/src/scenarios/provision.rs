//! Scenario 1: Provision
//!
//! Compiles the banking catalog with the bundled overrides, validates the
//! result, and creates the remote resource. The deployment record written
//! afterwards lets a second run attach to the same resource instead of
//! creating another one.
//!
//! Two rejected inputs follow, both stopped before any request is sent:
//!
//! Case A: a PROMPT_ATTACK filter with output strength set while output
//!         filtering is off → validation error listing every violation
//! Case B: a disabled encryption key → key unavailable

use tracing::warn;

use guardrail_audit::{DeploymentRecord, RecordStore};
use guardrail_contracts::{
    config::GuardrailConfig,
    error::{GuardrailError, GuardrailResult},
    lifecycle::{ResourceHandle, TerminalStatus},
    remote::KeyState,
};
use guardrail_core::Reconciler;
use guardrail_policy::{
    ConfigValidator, PolicyCompiler, PolicyOverrides, ValidatedDocument, ValidationOptions,
};

use crate::timestamped_name;

use super::{simulated_poll, SimulatedEnvironment, BANKING_OVERRIDES};

/// Output filtering stays off but a strength is set; the validator rejects it.
const BAD_PROMPT_ATTACK_OVERRIDES: &str = r#"
[[rules]]
kind = "content_filter"
type = "PROMPT_ATTACK"
output_strength = "HIGH"
output_enabled = false
"#;

/// How the deployment was obtained.
#[derive(Debug)]
pub enum Provisioned {
    /// A new resource was created and polled to `status`.
    Created {
        handle: ResourceHandle,
        status: TerminalStatus,
        record_saved: bool,
    },
    /// An existing resource named by the local record was reused.
    Attached(ResourceHandle),
}

impl Provisioned {
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Provisioned::Created { handle, .. } | Provisioned::Attached(handle) => handle,
        }
    }
}

/// Compile `overrides_toml` onto the banking catalog and validate it.
///
/// The document is named after `config.base_name` with a timestamp suffix
/// unless the overrides name it.
pub fn compile_banking(
    config: &GuardrailConfig,
    overrides_toml: &str,
) -> GuardrailResult<ValidatedDocument> {
    let mut overrides = PolicyOverrides::from_toml_str(overrides_toml)?;
    if overrides.name.is_none() {
        overrides = overrides.with_name(timestamped_name(&config.base_name));
    }
    let document = PolicyCompiler::banking(config).compile(&overrides)?;
    ConfigValidator::new(ValidationOptions::from_config(config)).approve(document)
}

/// Attach to the resource in the local record, or create a new one.
///
/// A record naming a resource the service no longer knows is ignored. The
/// record is written as soon as a create is accepted, before polling, so a
/// poll that times out still leaves the next run something to attach to. A
/// failed write is logged and the deployment still counts as done.
pub fn resume_or_create(
    reconciler: &Reconciler,
    store: &RecordStore,
    validated: &ValidatedDocument,
) -> GuardrailResult<Provisioned> {
    if let Some(record) = store.load()? {
        match reconciler.attach(&record.resource_id) {
            Ok(handle) => return Ok(Provisioned::Attached(handle)),
            Err(GuardrailError::NotFound(d)) => {
                warn!(
                    resource_id = %record.resource_id,
                    code = %d.code,
                    "deployment record names an unknown resource; creating a new one"
                );
            }
            Err(e) => return Err(e),
        }
    }

    let mut handle = reconciler.create(validated)?;
    let record_saved =
        store.save_best_effort(&DeploymentRecord::from_handle(&handle, &reconciler.config().region));
    let status = reconciler.poll_until_terminal(&mut handle, &simulated_poll(reconciler))?;

    Ok(Provisioned::Created { handle, status, record_saved })
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 1: Provision.
pub fn run_scenario(config: &GuardrailConfig) -> GuardrailResult<()> {
    println!("=== Scenario 1: Provision ===");
    println!();

    let env = SimulatedEnvironment::new(config, 2)?;
    let reconciler = env.reconciler(config);
    let store = RecordStore::from_config(config);

    // ── First run: compile, validate, create ──────────────────────────────────

    let validated = compile_banking(config, BANKING_OVERRIDES)?;
    {
        let doc = validated.document();
        println!("  Compiled document:      {}", doc.name);
        for (kind, group) in doc.groups() {
            println!("    {:<28} {} rule(s)", kind.field_name(), group.rules.len());
        }
        println!(
            "  Encryption key:         {}",
            doc.kms_key_id.as_deref().unwrap_or("(none)")
        );
        println!("  Validation:             PASS");
    }

    match resume_or_create(&reconciler, &store, &validated)? {
        Provisioned::Created { handle, status, record_saved } => {
            println!("  Created resource:       {} ({})", handle.id, handle.arn);
            println!("  Terminal status:        {:?}", status);
            println!(
                "  Deployment record:      {} ({})",
                if record_saved { "SAVED" } else { "NOT SAVED" },
                store.path().display()
            );
        }
        Provisioned::Attached(handle) => {
            println!("  Existing record found:  attached to {}", handle.id);
        }
    }
    println!();

    // ── Second run: the record short-circuits creation ────────────────────────

    {
        println!("  Second run with the same deployment record");
        let provisioned = resume_or_create(&reconciler, &store, &validated)?;
        let handle = provisioned.handle();
        let snapshot = reconciler.describe(&handle.id)?;
        match &provisioned {
            Provisioned::Attached(_) => {
                println!("  Attached to:            {} [{}]", handle.id, handle.state);
            }
            Provisioned::Created { .. } => {
                println!("  Record unavailable; created {} instead", handle.id);
            }
        }
        println!("  Remote status:          {}", snapshot.status);
        println!("  Remote rule count:      {}", snapshot.document.rule_count());
        println!("  Resources on service:   {}", env.policies.resource_count());
        println!();
    }

    // ── Case A: validator rejection ───────────────────────────────────────────

    {
        println!("  Case A: PROMPT_ATTACK output strength with output filtering disabled");
        match compile_banking(config, BAD_PROMPT_ATTACK_OVERRIDES) {
            Err(GuardrailError::Validation { violations }) => {
                for v in &violations {
                    println!("    [{}] {}", v.rule_id, v.message);
                }
                println!("  RESULT: Validation error (expected), nothing sent");
            }
            Err(e) => println!("  Unexpected error: {}", e),
            Ok(_) => println!("  Unexpectedly passed validation"),
        }
        println!();
    }

    // ── Case B: disabled key ──────────────────────────────────────────────────

    {
        println!("  Case B: encryption key disabled before create");
        match validated.document().kms_key_id.as_deref() {
            Some(key_ref) => {
                env.keys.set_key_state(key_ref, KeyState::Disabled)?;
                let before = env.policies.resource_count();
                match reconciler.create(&validated) {
                    Err(GuardrailError::KeyUnavailable { key_ref, reason, .. }) => {
                        println!("  Key:                    {}", key_ref);
                        println!("  Reason:                 {}", reason);
                        println!(
                            "  Resources created:      {}",
                            env.policies.resource_count() - before
                        );
                        println!("  RESULT: KeyUnavailable (expected)");
                    }
                    Err(e) => println!("  Unexpected error: {}", e),
                    Ok(handle) => println!("  Unexpectedly created {}", handle.id),
                }
            }
            None => println!("  Skipped: the compiled document names no key"),
        }
        println!();
    }

    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}
