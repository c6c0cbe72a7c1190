//! Scenario 4: Sealed Audit
//!
//! Records a full deployment into a hash-chained audit trail, seals the
//! exported log with the envelope key, and proves after opening that the
//! chain is intact. Opening under a different encryption context fails, and
//! an edited event is located by the chain check.

use uuid::Uuid;

use guardrail_audit::{first_broken_link, verify_chain, AuditLog, InMemoryAuditTrail, SecureEnvelope};
use guardrail_contracts::{
    config::GuardrailConfig,
    envelope::EncryptedEnvelope,
    error::{GuardrailError, GuardrailResult},
    remote::EncryptionContext,
};

use super::{provision::compile_banking, simulated_poll, SimulatedEnvironment, BANKING_OVERRIDES};

/// Seal `log` under the configured envelope key and context.
pub fn seal_log(
    envelope: &SecureEnvelope,
    log: &AuditLog,
    config: &GuardrailConfig,
) -> GuardrailResult<EncryptedEnvelope> {
    let payload = serde_json::to_value(log).map_err(|e| GuardrailError::Envelope {
        reason: format!("failed to serialize audit log: {}", e),
        diagnostics: None,
    })?;
    envelope.seal(&payload, &config.envelope_key_alias, &config.encryption_context())
}

/// Open a sealed log and parse it back.
pub fn open_log(
    envelope: &SecureEnvelope,
    sealed: &EncryptedEnvelope,
    context: &EncryptionContext,
) -> GuardrailResult<AuditLog> {
    let payload = envelope.open(sealed, context)?;
    serde_json::from_value(payload).map_err(|e| GuardrailError::Envelope {
        reason: format!("opened payload is not an audit log: {}", e),
        diagnostics: None,
    })
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 4: Sealed Audit.
pub fn run_scenario(config: &GuardrailConfig) -> GuardrailResult<()> {
    println!("=== Scenario 4: Sealed Audit ===");
    println!();

    let env = SimulatedEnvironment::new(config, 1)?;
    let trail = InMemoryAuditTrail::new(format!("deploy-{}", Uuid::new_v4()));
    let reconciler = env.reconciler(config).with_audit(Box::new(trail.clone()));
    let poll = simulated_poll(&reconciler);

    // ── Deployment with audit ─────────────────────────────────────────────────

    let validated = compile_banking(config, BANKING_OVERRIDES)?;
    let mut handle = reconciler.create(&validated)?;
    reconciler.poll_until_terminal(&mut handle, &poll)?;
    reconciler.deploy(&mut handle, None, &poll)?;

    let log = trail.export_log();
    println!("  Trail:                  {}", log.trail_id);
    for event in &log.events {
        println!(
            "    #{} {:<12} {} → {}  {}",
            event.sequence,
            event.record.operation.to_string(),
            event.record.from,
            event.record.to,
            &event.this_hash[..12]
        );
    }
    println!(
        "  Chain integrity:        {}",
        if trail.verify_integrity() { "VERIFIED" } else { "FAILED" }
    );
    println!();

    // ── Seal and open ─────────────────────────────────────────────────────────

    let envelope = SecureEnvelope::new(Box::new(env.keys.clone()));
    let context = config.encryption_context();
    let sealed = seal_log(&envelope, &log, config)?;
    println!("  Sealed with key:        {} ({})", sealed.key_id, sealed.algorithm);
    println!("  Ciphertext:             {} byte(s)", sealed.ciphertext.len());

    let restored = open_log(&envelope, &sealed, &context)?;
    println!(
        "  Opened log:             {} event(s), chain {}",
        restored.events.len(),
        if verify_chain(&restored.events) { "VERIFIED" } else { "FAILED" }
    );
    println!(
        "  Terminal hash matches:  {}",
        if restored.terminal_hash == log.terminal_hash { "YES" } else { "NO" }
    );
    println!();

    // ── Wrong context ─────────────────────────────────────────────────────────

    {
        println!("  Opening with environment=production instead of {}", config.environment);
        let mut wrong = context.clone();
        wrong.insert("environment".to_string(), "production".to_string());
        match open_log(&envelope, &sealed, &wrong) {
            Err(GuardrailError::Envelope { reason, .. }) => {
                println!("  Open failed:            {}", reason);
                println!("  RESULT: Envelope error (expected)");
            }
            Err(e) => println!("  Unexpected error: {}", e),
            Ok(_) => println!("  Unexpectedly opened under the wrong context"),
        }
        println!();
    }

    // ── Tampering ─────────────────────────────────────────────────────────────

    {
        println!("  Editing event #1 in the opened copy");
        let mut events = restored.events;
        if let Some(event) = events.get_mut(1) {
            event.record.detail = Some("status rewritten".to_string());
        }
        match first_broken_link(&events) {
            Some(sequence) => println!("  Chain broken at:        #{}", sequence),
            None => println!("  Chain unexpectedly intact"),
        }
        println!();
    }

    println!("  Scenario 4 complete.");
    println!();

    Ok(())
}
