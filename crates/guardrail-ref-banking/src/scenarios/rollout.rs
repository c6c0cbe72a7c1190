//! Scenario 2: Rollout
//!
//! Walks one resource through its lifecycle and the ways a rollout goes
//! wrong:
//!
//! Step 1: create → READY → cut version 1 → activate → ACTIVE
//! Step 2: redeploy with nothing to change → no-op
//! Step 3: another client edits between read and write → Conflict, retry
//! Step 4: slow provisioning → Timeout, then polling resumes
//! Step 5: provisioning fails → FAILED with the service's reasons
//! Step 6: list resources with their newest versions

use guardrail_contracts::{
    config::GuardrailConfig,
    error::{GuardrailError, GuardrailResult},
    lifecycle::TerminalStatus,
    remote::{ResourceStatus, ResourceSummary},
};
use guardrail_core::{DeployOutcome, PollOptions};

use super::{provision::compile_banking, simulated_poll, SimulatedEnvironment, BANKING_OVERRIDES};

/// Reads a slow resource needs before it settles.
const SLOW_PROVISIONING_READS: u32 = 10;

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 2: Rollout.
pub fn run_scenario(config: &GuardrailConfig) -> GuardrailResult<()> {
    println!("=== Scenario 2: Rollout ===");
    println!();

    let env = SimulatedEnvironment::new(config, 1)?;
    let reconciler = env.reconciler(config);
    let poll = simulated_poll(&reconciler);
    let validated = compile_banking(config, BANKING_OVERRIDES)?;

    // ── Step 1: first activation ──────────────────────────────────────────────

    let mut handle = reconciler.create(&validated)?;
    {
        println!("  Step 1: create and activate the first version");
        let created = reconciler.poll_until_terminal(&mut handle, &poll)?;
        println!("  Resource:               {} → {:?}", handle.id, created);

        let v1 = reconciler.cut_version(&mut handle, Some("Initial banking policy"))?;
        println!("  Version cut:            {}", v1.version);

        let activation = reconciler.activate(&mut handle, v1.version)?;
        println!("  Carried forward:        {}", activation.carried_fields.join(", "));
        println!("  Not carried:            {}", activation.uncarried_fields.join(", "));

        let status = reconciler.poll_until_terminal(&mut handle, &poll)?;
        let snapshot = reconciler.describe(&handle.id)?;
        println!("  Terminal status:        {:?}", status);
        println!("  Serving version:        {:?}", snapshot.current_version);
        println!("  Tags after activation:  {}", snapshot.document.tags.len());
        println!();
    }

    // ── Step 2: no-op redeploy ────────────────────────────────────────────────

    {
        println!("  Step 2: redeploy with nothing to change");
        match reconciler.deploy(&mut handle, None, &poll)? {
            DeployOutcome::AlreadyActive { version } => {
                println!("  Already active on:      {:?}", version);
                println!("  RESULT: no-op (expected)");
            }
            DeployOutcome::Activated { version, .. } => {
                println!("  Unexpectedly activated {}", version);
            }
        }
        println!();
    }

    // ── Step 3: concurrent edit ───────────────────────────────────────────────

    {
        println!("  Step 3: another client edits the resource during activation");
        let v2 = reconciler.cut_version(&mut handle, Some("Tightened topic policy"))?;
        env.policies.inject_concurrent_edit(&handle.id);

        match reconciler.activate(&mut handle, v2.version) {
            Err(GuardrailError::Conflict(d)) => {
                println!("  Activation of {}:    Conflict ({})", v2.version, d);
                println!("  Local state unchanged:  {}", handle.state);
            }
            Err(e) => return Err(e),
            Ok(_) => println!("  Unexpectedly activated without a conflict"),
        }

        match reconciler.deploy(&mut handle, Some(v2.version), &poll)? {
            DeployOutcome::Activated { version, status, .. } => {
                println!("  Retry activated:        {} → {:?}", version, status);
                println!("  RESULT: Conflict surfaced, retry succeeded (expected)");
            }
            DeployOutcome::AlreadyActive { version } => {
                println!("  Already active on {:?}", version);
            }
        }
        println!();
    }

    // ── Step 4: timeout and resume ────────────────────────────────────────────

    {
        println!("  Step 4: provisioning slower than the poll budget");
        let slow = SimulatedEnvironment::new(config, SLOW_PROVISIONING_READS)?;
        let slow_reconciler = slow.reconciler(config);
        let mut slow_handle = slow_reconciler.create(&validated)?;

        let short = PollOptions { max_attempts: 3, ..poll.clone() };
        match slow_reconciler.poll_until_terminal(&mut slow_handle, &short) {
            Err(e @ GuardrailError::Timeout { .. }) => {
                println!("  First poll:             {}", e);
                println!("  Recoverable:            {}", e.is_recoverable());
            }
            Err(e) => return Err(e),
            Ok(status) => println!("  Settled early: {:?}", status),
        }

        let patient = PollOptions {
            max_attempts: SLOW_PROVISIONING_READS * 2,
            ..poll.clone()
        };
        let status = slow_reconciler.poll_until_terminal(&mut slow_handle, &patient)?;
        println!("  Resumed poll:           {:?}", status);
        println!("  RESULT: Timeout, then READY on resume (expected)");
        println!();
    }

    // ── Step 5: provisioning failure ──────────────────────────────────────────

    {
        println!("  Step 5: the service fails provisioning");
        let failing = SimulatedEnvironment::new(config, 1)?;
        failing
            .policies
            .fail_provisioning(vec!["Topic definition exceeds 200 characters".to_string()]);
        let failing_reconciler = failing.reconciler(config);
        let mut failing_handle = failing_reconciler.create(&validated)?;

        match failing_reconciler.poll_until_terminal(&mut failing_handle, &poll)? {
            TerminalStatus::Failed { reasons } => {
                println!("  Terminal status:        FAILED");
                for reason in &reasons {
                    println!("    - {}", reason);
                }
                println!("  Local state:            {}", failing_handle.state);
                println!("  RESULT: Failed with reasons (expected)");
            }
            other => println!("  Unexpected status: {:?}", other),
        }
        println!();
    }

    // ── Step 6: listing ───────────────────────────────────────────────────────

    {
        println!("  Step 6: list resources");
        env.policies.add_listing(ResourceSummary {
            id: String::new(),
            name: "half-deleted-entry".to_string(),
            status: ResourceStatus::Deleting,
            arn: String::new(),
        });

        let listings = reconciler.list(config.list_page_size())?;
        for listing in &listings {
            println!(
                "    {} {:<40} {:<10} latest: {}",
                listing.summary.id,
                listing.summary.name,
                listing.summary.status.to_string(),
                listing
                    .latest_version
                    .as_ref()
                    .map(|v| v.version.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        println!("  Listed {} resource(s); entries without an id skipped", listings.len());
        println!();
    }

    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}
