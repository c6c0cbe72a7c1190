//! # guardrail-policy
//!
//! Builds and checks the policy document for the banking guardrail.
//!
//! ## Overview
//!
//! - [`Catalog`] holds the static banking defaults: content filters, sensitive
//!   words, denied topics, PII entities, regexes, and grounding thresholds.
//! - [`PolicyCompiler`] merges [`PolicyOverrides`] (usually loaded from TOML)
//!   onto the catalog and produces one immutable `PolicyDocument`.
//! - [`ConfigValidator`] checks the document before it leaves the process and
//!   hands back a [`ValidatedDocument`] that the reconciler accepts.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use guardrail_policy::{ConfigValidator, PolicyCompiler, PolicyOverrides, ValidationOptions};
//!
//! let overrides = PolicyOverrides::from_file(Path::new("policies/banking_overrides.toml"))?;
//! let document = PolicyCompiler::banking(&config).compile(&overrides)?;
//! let validated = ConfigValidator::new(ValidationOptions::from_config(&config)).approve(document)?;
//! ```

pub mod catalog;
pub mod compiler;
pub mod overrides;
pub mod validator;

pub use catalog::Catalog;
pub use compiler::{CompilerOptions, PolicyCompiler};
pub use overrides::{PolicyOverrides, RuleOverride, RuleRef};
pub use validator::{is_valid_key_ref, ConfigValidator, ValidatedDocument, ValidationOptions};

// ── Tests ─────────────────────────────────────────────────────────────────────
