//! Banking Guardrail Toolkit: demo CLI
//!
//! Runs the banking reference scenarios against a simulated policy service,
//! and exposes the compiler, validator, and grounding checks directly.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- provision
//!   cargo run -p demo -- rollout
//!   cargo run -p demo -- grounding --response "..." --context "..."
//!   cargo run -p demo -- sealed-audit
//!   cargo run -p demo -- --config guardrail.toml compile --overrides overrides.toml

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use guardrail_contracts::{
    config::GuardrailConfig,
    error::{GuardrailError, GuardrailResult},
};
use guardrail_policy::{ConfigValidator, PolicyCompiler, PolicyOverrides, ValidationOptions};
use guardrail_ref_banking::scenarios::{
    grounding, provision, rollout, sealed_audit, BANKING_OVERRIDES,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Banking guardrail toolkit demo.
///
/// Each scenario wires the real compiler, validator, reconciler, audit trail,
/// envelope, and grounding evaluator to an in-process policy and key service.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Banking guardrail toolkit demo",
    long_about = "Runs banking guardrail scenarios showing policy compilation and validation,\n\
                  lifecycle reconciliation, sealed audit trails, and grounding checks."
)]
struct Cli {
    /// Toolkit configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: compile, validate, create, and reuse the deployment record.
    Provision,
    /// Scenario 2: versions, activation, conflicts, timeouts, and listing.
    Rollout,
    /// Scenario 3: grounding checks, or one (response, context) pair.
    Grounding {
        #[arg(long, requires = "context")]
        response: Option<String>,
        #[arg(long, requires = "response")]
        context: Option<String>,
    },
    /// Scenario 4: hash-chained audit trail sealed in an encrypted envelope.
    SealedAudit,
    /// Print the compiled policy document as JSON.
    Compile {
        /// Overrides file; the bundled banking overrides when omitted.
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Compile and validate, listing every violation.
    Validate {
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Command::RunAll => {
            print_banner();
            run_all(&config)
        }
        Command::Provision => provision::run_scenario(&config),
        Command::Rollout => rollout::run_scenario(&config),
        Command::Grounding { response: Some(response), context: Some(context) } => {
            let verdict = grounding::evaluate_pair(&response, &context);
            grounding::print_verdict(&verdict);
            Ok(())
        }
        Command::Grounding { .. } => grounding::run_scenario(&config),
        Command::SealedAudit => sealed_audit::run_scenario(&config),
        Command::Compile { overrides } => compile(&config, overrides.as_ref()),
        Command::Validate { overrides } => validate(&config, overrides.as_ref()),
    });

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        if let GuardrailError::Validation { violations } = &e {
            for v in violations {
                eprintln!("  [{}] {}", v.rule_id, v.message);
            }
        }
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> GuardrailResult<GuardrailConfig> {
    match path {
        Some(path) => {
            let config = GuardrailConfig::from_file(path)?;
            info!(path = %path.display(), region = %config.region, "configuration loaded");
            Ok(config)
        }
        None => Ok(GuardrailConfig::default()),
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all(config: &GuardrailConfig) -> GuardrailResult<()> {
    provision::run_scenario(config)?;
    rollout::run_scenario(config)?;
    grounding::run_scenario(config)?;
    sealed_audit::run_scenario(config)?;
    println!("All scenarios completed successfully.");
    Ok(())
}

// ── Compiler and validator ────────────────────────────────────────────────────

fn load_overrides(path: Option<&PathBuf>) -> GuardrailResult<PolicyOverrides> {
    match path {
        Some(path) => PolicyOverrides::from_file(path),
        None => PolicyOverrides::from_toml_str(BANKING_OVERRIDES),
    }
}

fn compile(config: &GuardrailConfig, overrides: Option<&PathBuf>) -> GuardrailResult<()> {
    let document = PolicyCompiler::banking(config).compile(&load_overrides(overrides)?)?;
    let json = document.to_canonical_json().map_err(|e| GuardrailError::Compilation {
        reason: format!("failed to serialize compiled document: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}

fn validate(config: &GuardrailConfig, overrides: Option<&PathBuf>) -> GuardrailResult<()> {
    let document = PolicyCompiler::banking(config).compile(&load_overrides(overrides)?)?;
    let rules = document.rule_count();
    let validated = ConfigValidator::new(ValidationOptions::from_config(config)).approve(document)?;
    println!(
        "Policy '{}' is valid ({} rule(s)).",
        validated.document().name,
        rules
    );
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Banking Guardrail Toolkit");
    println!("Reference Demo");
    println!("=========================");
    println!();
    println!("Deployment pipeline:");
    println!("  [1] Compiler merges the banking catalog with caller overrides");
    println!("  [2] Validator checks the document; nothing invalid leaves the process");
    println!("  [3] Reconciler creates, versions, activates, and polls the resource");
    println!("  [4] Every lifecycle step is written to a SHA-256 chained audit trail");
    println!("  [5] Replies are checked for grounding against their context");
    println!();
}
