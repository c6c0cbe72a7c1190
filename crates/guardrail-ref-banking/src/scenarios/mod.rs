//! Banking reference scenarios.
//!
//! Each scenario wires the real toolkit components (compiler, validator,
//! reconciler, audit trail, envelope, grounding evaluator) to the simulated
//! policy service and the local key service, and prints what happens at
//! every step.

use std::time::Duration;

use guardrail_audit::LocalKeyService;
use guardrail_contracts::{config::GuardrailConfig, error::GuardrailResult};
use guardrail_core::{cancel::ThreadSleeper, PollOptions, Reconciler};

use crate::mock_service::MockPolicyService;

pub mod grounding;
pub mod provision;
pub mod rollout;
pub mod sealed_audit;

/// Overrides every scenario compiles with.
pub const BANKING_OVERRIDES: &str = include_str!("../../policies/banking_overrides.toml");

/// The simulated remote side of one scenario run.
pub struct SimulatedEnvironment {
    pub policies: MockPolicyService,
    pub keys: LocalKeyService,
}

impl SimulatedEnvironment {
    /// A policy service whose resources spend `provisioning_reads` reads in
    /// CREATING/UPDATING, and a key service holding the configured aliases.
    pub fn new(config: &GuardrailConfig, provisioning_reads: u32) -> GuardrailResult<Self> {
        let keys = LocalKeyService::with_alias(config.region.clone(), &config.envelope_key_alias)?;
        if let Some(alias) = config.kms_key_id.as_deref() {
            if alias.starts_with("alias/") && alias != config.envelope_key_alias {
                let key_id = keys.create_key();
                keys.create_alias(alias, &key_id)?;
            }
        }
        Ok(Self {
            policies: MockPolicyService::new(config.region.clone(), provisioning_reads),
            keys,
        })
    }

    pub fn reconciler(&self, config: &GuardrailConfig) -> Reconciler {
        Reconciler::new(
            Box::new(self.policies.clone()),
            Box::new(self.keys.clone()),
            config.clone(),
        )
        .with_sleeper(Box::new(ThreadSleeper::new(Duration::from_millis(1))))
    }
}

/// Configured poll bounds without the wait between reads; the simulated
/// service advances per read, not per second.
pub fn simulated_poll(reconciler: &Reconciler) -> PollOptions {
    PollOptions {
        interval: Duration::ZERO,
        ..reconciler.poll_options()
    }
}
