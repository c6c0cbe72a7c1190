//! Configuration validator.
//!
//! `ConfigValidator` checks a policy document before anything is sent to the
//! remote service. Checks run in order:
//!
//! 1. **Required fields**: name, both messaging strings, and the content,
//!    word, and topic groups must be present and non-empty. Every missing
//!    field is reported.
//! 2. **Group shape**: each group may only hold rules of its own kind. A
//!    mis-shaped group is reported once and its rule-level checks are skipped.
//! 3. **Rule invariants**: actions drawn from the allowed set for the rule
//!    kind, PROMPT_ATTACK output strength NONE while output filtering is
//!    disabled, grounding thresholds in `[0, 1)`, regex patterns that compile.
//! 4. **Encryption key**: present when the deployment requires one, and
//!    matching the key-service identifier grammar whenever given.
//!
//! Only structural failures short-circuit. All other violations are collected
//! so operators see the full set in one pass.
//!
//! [`ConfigValidator::validate_value`] accepts an untyped JSON document and
//! runs a JSON Schema structural phase before the typed checks.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use guardrail_contracts::{
    config::GuardrailConfig,
    document::{GroupKind, PolicyDocument, RuleGroup},
    error::{GuardrailError, GuardrailResult},
    rule::{ContentFilterType, FilterStrength, PolicyRule, RuleKind},
    validation::{ValidationResult, Violation},
};

/// Key id (UUID or multi-region `mrk-`), key ARN, alias name, or alias ARN.
static KEY_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^(?:
            (?:[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|mrk-[0-9a-f]{32})
          | arn:aws[a-z-]*:kms:[a-z0-9-]+:\d{12}:key/(?:[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}|mrk-[0-9a-f]{32})
          | alias/[a-zA-Z0-9/_-]+
          | arn:aws[a-z-]*:kms:[a-z0-9-]+:\d{12}:alias/[a-zA-Z0-9/_-]+
        )$",
    )
    .unwrap()
});

/// Whether `key_ref` is a syntactically valid key-service identifier.
pub fn is_valid_key_ref(key_ref: &str) -> bool {
    KEY_REF_RE.is_match(key_ref)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Whether the deployment target requires an encryption key reference.
    pub require_encryption_key: bool,
}

impl ValidationOptions {
    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self { require_encryption_key: config.require_encryption_key }
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}

/// A document that passed validation. Only [`ConfigValidator::approve`]
/// constructs one, so holding it proves the checks ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDocument(PolicyDocument);

impl ValidatedDocument {
    pub fn document(&self) -> &PolicyDocument {
        &self.0
    }

    pub fn into_inner(self) -> PolicyDocument {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigValidator {
    options: ValidationOptions,
}

impl ConfigValidator {
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    /// Validate a typed document.
    pub fn validate(&self, doc: &PolicyDocument) -> ValidationResult {
        let violations = self.check(doc, &[]);
        self.finish(&doc.name, violations)
    }

    /// Validate `doc` and wrap it as a [`ValidatedDocument`].
    ///
    /// Returns `GuardrailError::Validation` carrying every violation.
    pub fn approve(&self, doc: PolicyDocument) -> GuardrailResult<ValidatedDocument> {
        match self.validate(&doc) {
            ValidationResult::Valid => Ok(ValidatedDocument(doc)),
            ValidationResult::Invalid(violations) => Err(GuardrailError::Validation { violations }),
        }
    }

    /// Validate an untyped wire-form document.
    ///
    /// The JSON Schema phase reports missing top-level fields and wrong-typed
    /// groups. Missing or malformed top-level fields end validation there; a
    /// malformed group is dropped and the rest of the document still goes
    /// through the typed checks.
    pub fn validate_value(&self, value: &serde_json::Value) -> ValidationResult {
        let mut violations = Vec::new();
        let mut malformed: Vec<GroupKind> = Vec::new();
        let mut top_level_failure = false;

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        let schema = wire_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                for error in validator.iter_errors(value) {
                    let path = error.instance_path.to_string();
                    let message = format!("JSON Schema violation at '{}': {}", path, error);
                    warn!(%message, "structural validation failure");

                    let field = path.trim_start_matches('/').split('/').next().unwrap_or("");
                    match GroupKind::ALL.into_iter().find(|g| g.field_name() == field) {
                        Some(group) => {
                            if !malformed.contains(&group) {
                                malformed.push(group);
                            }
                        }
                        None => top_level_failure = true,
                    }
                    violations.push(Violation::new("json-schema", message));
                }
            }
            Err(e) => {
                let message = format!("invalid JSON Schema document: {e}");
                warn!(%message, "schema compilation failure");
                violations.push(Violation::new("json-schema", message));
                top_level_failure = true;
            }
        }

        if top_level_failure {
            return ValidationResult::Invalid(violations);
        }

        // ── Phase 2: typed checks on what remains ─────────────────────────────
        let mut pruned = value.clone();
        if let Some(object) = pruned.as_object_mut() {
            for group in &malformed {
                object.remove(group.field_name());
            }
        }

        let doc: PolicyDocument = match serde_json::from_value(pruned) {
            Ok(doc) => doc,
            Err(e) => {
                let message = format!("document does not match the policy model: {e}");
                warn!(%message, "typed decoding failure");
                violations.push(Violation::new("document-shape", message));
                return ValidationResult::Invalid(violations);
            }
        };

        violations.extend(self.check(&doc, &malformed));
        self.finish(&doc.name, violations)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn finish(&self, name: &str, violations: Vec<Violation>) -> ValidationResult {
        for v in &violations {
            warn!(document = %name, rule_id = %v.rule_id, message = %v.message, "policy violation");
        }
        debug!(
            document = %name,
            violation_count = violations.len(),
            "validation complete"
        );
        ValidationResult::from_violations(violations)
    }

    /// Typed checks. Groups in `skip` were already reported as malformed.
    fn check(&self, doc: &PolicyDocument, skip: &[GroupKind]) -> Vec<Violation> {
        let mut violations = Vec::new();

        // ── Required fields ───────────────────────────────────────────────────
        for (field, value) in [
            ("name", &doc.name),
            ("blockedInputMessaging", &doc.blocked_input_messaging),
            ("blockedOutputsMessaging", &doc.blocked_outputs_messaging),
        ] {
            if value.trim().is_empty() {
                violations.push(Violation::new(
                    "required-field",
                    format!("'{field}' is missing or empty"),
                ));
            }
        }

        for group in GroupKind::REQUIRED {
            if skip.contains(&group) {
                continue;
            }
            match doc.group(group) {
                None => violations.push(Violation::new(
                    "required-field",
                    format!("'{}' is missing", group.field_name()),
                )),
                Some(g) if g.is_empty() => violations.push(Violation::new(
                    "required-field",
                    format!("'{}' must contain at least one rule", group.field_name()),
                )),
                Some(_) => {}
            }
        }

        // ── Group shape, then per-rule invariants ─────────────────────────────
        for (group, rules) in doc.groups() {
            if skip.contains(&group) {
                continue;
            }
            if let Some(violation) = shape_violation(group, rules) {
                violations.push(violation);
                continue;
            }
            for rule in &rules.rules {
                rule_violations(rule, &mut violations);
            }
        }

        // ── Encryption key ────────────────────────────────────────────────────
        match doc.kms_key_id.as_deref() {
            Some(key_ref) if !is_valid_key_ref(key_ref) => violations.push(Violation::new(
                "encryption-key",
                format!(
                    "key reference '{key_ref}' is not a key id, key ARN, alias name, or alias ARN"
                ),
            )),
            Some(_) => {}
            None if self.options.require_encryption_key => violations.push(Violation::new(
                "encryption-key",
                "an encryption key reference is required for this deployment",
            )),
            None => {}
        }

        violations
    }
}

fn shape_violation(group: GroupKind, rules: &RuleGroup) -> Option<Violation> {
    let foreign: Vec<String> = rules
        .rules
        .iter()
        .filter(|r| !group.accepts(r.kind()))
        .map(|r| r.label())
        .collect();
    (!foreign.is_empty()).then(|| {
        Violation::new(
            "group-shape",
            format!(
                "'{}' holds rules of the wrong kind: {}",
                group.field_name(),
                foreign.join(", ")
            ),
        )
    })
}

fn rule_violations(rule: &PolicyRule, violations: &mut Vec<Violation>) {
    let kind = rule.kind();
    for (direction, action) in rule.actions() {
        if !kind.allowed_actions().contains(&action) {
            violations.push(Violation::new(
                "allowed-action",
                format!(
                    "{}: {direction} action {action} is not allowed for {kind} rules",
                    rule.label()
                ),
            ));
        }
    }

    match rule {
        PolicyRule::ContentFilter(c)
            if c.filter_type == ContentFilterType::PromptAttack
                && !c.output.enabled
                && c.output_strength != FilterStrength::None =>
        {
            violations.push(Violation::new(
                "prompt-attack-output",
                format!(
                    "{}: output strength must be NONE while output filtering is disabled, got {}",
                    rule.label(),
                    c.output_strength
                ),
            ));
        }
        PolicyRule::GroundingFilter(g) if !(0.0..1.0).contains(&g.threshold) => {
            violations.push(Violation::new(
                "grounding-threshold",
                format!("{}: threshold {} is outside [0, 1)", rule.label(), g.threshold),
            ));
        }
        PolicyRule::Regex(r) if Regex::new(&r.pattern).is_err() => {
            violations.push(Violation::new(
                "regex-pattern",
                format!("{}: pattern does not compile", rule.label()),
            ));
        }
        _ => {}
    }
}

/// Structural schema for the wire form of a policy document.
fn wire_schema() -> serde_json::Value {
    let group = |kinds: &[RuleKind]| {
        let kinds: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        json!({
            "type": "object",
            "required": ["rules"],
            "properties": {
                "rules": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["kind"],
                        "properties": { "kind": { "enum": kinds } }
                    }
                }
            }
        })
    };

    json!({
        "type": "object",
        "required": [
            "name",
            "blockedInputMessaging",
            "blockedOutputsMessaging",
            "contentPolicy",
            "wordPolicy",
            "topicPolicy"
        ],
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" },
            "blockedInputMessaging": { "type": "string" },
            "blockedOutputsMessaging": { "type": "string" },
            "kmsKeyId": { "type": "string" },
            "tags": { "type": "object", "additionalProperties": { "type": "string" } },
            "contentPolicy": group(&[RuleKind::ContentFilter]),
            "wordPolicy": group(&[RuleKind::Word]),
            "topicPolicy": group(&[RuleKind::Topic]),
            "sensitiveInformationPolicy": group(&[RuleKind::PiiEntity, RuleKind::Regex]),
            "contextualGroundingPolicy": group(&[RuleKind::GroundingFilter])
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
