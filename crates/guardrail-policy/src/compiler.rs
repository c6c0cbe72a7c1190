//! Policy Configuration Compiler.
//!
//! Merges caller overrides onto the catalog and produces one immutable
//! `PolicyDocument`. The compiler:
//!
//! 1. Parses every override's kind and type against the finite rule enums.
//! 2. Replaces a catalog rule in place when an override names it, otherwise
//!    appends the new rule after the catalog rules of its group.
//! 3. Drops the rules listed under `remove`.
//! 4. Groups rules by kind and fills document fields from overrides, falling
//!    back to catalog and configuration defaults.
//!
//! Compilation is pure: the same catalog and overrides always produce a
//! byte-identical canonical document.

use std::str::FromStr;

use regex::Regex;
use tracing::{debug, info};

use guardrail_contracts::{
    config::GuardrailConfig,
    document::{GroupKind, PolicyDocument, RuleGroup},
    error::{GuardrailError, GuardrailResult},
    rule::{
        Action, ContentFilterRule, ContentFilterType, DirectionPolicy, FilterStrength,
        GroundingFilterRule, GroundingFilterType, PiiEntityRule, PiiEntityType, PolicyRule,
        RegexRule, RuleKind, TopicRule, TopicType, WordRule,
    },
};

use crate::{
    catalog::Catalog,
    overrides::{PolicyOverrides, RuleOverride, RuleRef},
};

/// Defaults the compiler takes from configuration rather than the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Document name when the overrides give none.
    pub base_name: String,
    /// Encryption key when the overrides give none.
    pub kms_key_id: Option<String>,
}

impl CompilerOptions {
    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self {
            base_name: config.base_name.clone(),
            kms_key_id: config.kms_key_id.clone(),
        }
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}

/// Turns a catalog plus overrides into a policy document.
#[derive(Debug, Clone)]
pub struct PolicyCompiler {
    catalog: Catalog,
    options: CompilerOptions,
}

impl PolicyCompiler {
    pub fn new(catalog: Catalog, options: CompilerOptions) -> Self {
        Self { catalog, options }
    }

    /// A compiler over the banking catalog configured from `config`.
    pub fn banking(config: &GuardrailConfig) -> Self {
        Self::new(Catalog::banking(), CompilerOptions::from_config(config))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Compile `overrides` onto the catalog.
    ///
    /// Returns `GuardrailError::Compilation` when an override names an
    /// unknown kind, type, action, or strength, or carries an invalid
    /// parameter (bad regex, threshold outside `[0, 1)`, missing required
    /// field for a new rule).
    pub fn compile(&self, overrides: &PolicyOverrides) -> GuardrailResult<PolicyDocument> {
        let mut rules = self.catalog.rules.clone();

        for ov in &overrides.rules {
            let kind = parse_kind(&ov.kind, ov.display_name())?;
            let identity = override_identity(kind, ov)?;
            let position = rules
                .iter()
                .position(|r| r.kind() == kind && r.identity() == identity);

            let rule = build_rule(kind, ov, position.map(|i| &rules[i]))?;
            match position {
                Some(i) => {
                    debug!(rule = %rule.label(), "override replaces catalog rule");
                    rules[i] = rule;
                }
                None => {
                    debug!(rule = %rule.label(), "override appends new rule");
                    rules.push(rule);
                }
            }
        }

        for removal in &overrides.remove {
            let kind = parse_kind(&removal.kind, &removal.name)?;
            let identity = ref_identity(kind, removal)?;
            match rules
                .iter()
                .position(|r| r.kind() == kind && r.identity() == identity)
            {
                Some(i) => {
                    let removed = rules.remove(i);
                    debug!(rule = %removed.label(), "rule removed by override");
                }
                None => {
                    return Err(GuardrailError::Compilation {
                        reason: format!("no {} rule named '{}' to remove", kind, removal.name),
                    });
                }
            }
        }

        let group = |kind: GroupKind| -> Vec<PolicyRule> {
            rules
                .iter()
                .filter(|r| GroupKind::for_rule(r.kind()) == kind)
                .cloned()
                .collect()
        };
        // Required groups are always emitted so the validator can report
        // them as empty rather than absent.
        let required = |kind: GroupKind| Some(RuleGroup::new(group(kind)));
        let optional = |kind: GroupKind| {
            let rules = group(kind);
            (!rules.is_empty()).then(|| RuleGroup::new(rules))
        };

        let mut tags = self.catalog.tags.clone();
        tags.extend(overrides.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        let document = PolicyDocument {
            name: overrides
                .name
                .clone()
                .unwrap_or_else(|| self.options.base_name.clone()),
            description: overrides
                .description
                .clone()
                .unwrap_or_else(|| self.catalog.description.clone()),
            blocked_input_messaging: overrides
                .blocked_input_messaging
                .clone()
                .unwrap_or_else(|| self.catalog.blocked_input_messaging.clone()),
            blocked_outputs_messaging: overrides
                .blocked_outputs_messaging
                .clone()
                .unwrap_or_else(|| self.catalog.blocked_outputs_messaging.clone()),
            content_policy: required(GroupKind::ContentPolicy),
            word_policy: required(GroupKind::WordPolicy),
            topic_policy: required(GroupKind::TopicPolicy),
            sensitive_information_policy: optional(GroupKind::SensitiveInformationPolicy),
            contextual_grounding_policy: optional(GroupKind::ContextualGroundingPolicy),
            kms_key_id: overrides
                .kms_key_id
                .clone()
                .or_else(|| self.options.kms_key_id.clone()),
            tags,
        };

        info!(
            name = %document.name,
            rule_count = document.rule_count(),
            overrides = overrides.rules.len(),
            removals = overrides.remove.len(),
            "policy document compiled"
        );

        Ok(document)
    }
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

fn compilation(reason: String) -> GuardrailError {
    GuardrailError::Compilation { reason }
}

fn parse_enum<T: FromStr>(what: &str, value: &str, rule: &str) -> GuardrailResult<T> {
    T::from_str(value.trim())
        .map_err(|_| compilation(format!("unknown {what} '{value}' in rule '{rule}'")))
}

fn parse_kind(kind: &str, rule: &str) -> GuardrailResult<RuleKind> {
    parse_enum("rule kind", kind, rule)
}

fn required_field<'a>(value: Option<&'a str>, field: &str, kind: RuleKind) -> GuardrailResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(compilation(format!("{kind} override is missing '{field}'"))),
    }
}

/// The identity an override is matched against, normalised the same way
/// `PolicyRule::identity` normalises catalog rules.
fn override_identity(kind: RuleKind, ov: &RuleOverride) -> GuardrailResult<String> {
    match kind {
        RuleKind::Topic | RuleKind::Regex => {
            Ok(required_field(ov.name.as_deref(), "name", kind)?.to_string())
        }
        RuleKind::Word => {
            let text = required_field(ov.text.as_deref().or(ov.name.as_deref()), "text", kind)?;
            Ok(text.to_lowercase())
        }
        RuleKind::PiiEntity | RuleKind::ContentFilter | RuleKind::GroundingFilter => {
            let value = required_field(ov.rule_type.as_deref(), "type", kind)?;
            type_identity(kind, value)
        }
    }
}

fn ref_identity(kind: RuleKind, removal: &RuleRef) -> GuardrailResult<String> {
    match kind {
        RuleKind::Topic | RuleKind::Regex => Ok(removal.name.trim().to_string()),
        RuleKind::Word => Ok(removal.name.trim().to_lowercase()),
        RuleKind::PiiEntity | RuleKind::ContentFilter | RuleKind::GroundingFilter => {
            type_identity(kind, &removal.name)
        }
    }
}

fn type_identity(kind: RuleKind, value: &str) -> GuardrailResult<String> {
    let identity = match kind {
        RuleKind::PiiEntity => parse_enum::<PiiEntityType>("PII entity type", value, value)?.to_string(),
        RuleKind::ContentFilter => {
            parse_enum::<ContentFilterType>("content filter type", value, value)?.to_string()
        }
        RuleKind::GroundingFilter => {
            parse_enum::<GroundingFilterType>("grounding filter type", value, value)?.to_string()
        }
        RuleKind::Topic | RuleKind::Word | RuleKind::Regex => value.to_string(),
    };
    Ok(identity)
}

/// Resolve one direction from the override, falling back to `base`.
fn direction(
    rule: &str,
    enabled: Option<bool>,
    action: Option<&str>,
    base: DirectionPolicy,
) -> GuardrailResult<DirectionPolicy> {
    let action = match action {
        Some(a) => parse_enum::<Action>("action", a, rule)?,
        None => base.action,
    };
    Ok(DirectionPolicy {
        enabled: enabled.unwrap_or(base.enabled),
        action,
    })
}

fn directions(
    rule: &str,
    ov: &RuleOverride,
    base: Option<(DirectionPolicy, DirectionPolicy)>,
) -> GuardrailResult<(DirectionPolicy, DirectionPolicy)> {
    let (base_in, base_out) = base.unwrap_or((DirectionPolicy::BLOCK, DirectionPolicy::BLOCK));
    let input = direction(
        rule,
        ov.input_enabled.or(ov.enabled),
        ov.input_action.as_deref().or(ov.action.as_deref()),
        base_in,
    )?;
    let output = direction(
        rule,
        ov.output_enabled.or(ov.enabled),
        ov.output_action.as_deref().or(ov.action.as_deref()),
        base_out,
    )?;
    Ok((input, output))
}

fn strength(
    rule: &str,
    value: Option<&str>,
    base: Option<FilterStrength>,
) -> GuardrailResult<FilterStrength> {
    match value {
        Some(s) => parse_enum("filter strength", s, rule),
        None => Ok(base.unwrap_or(FilterStrength::High)),
    }
}

// ── Rule construction ─────────────────────────────────────────────────────────

/// Build the rule an override describes. `existing` is the catalog rule it
/// replaces, whose values fill any field the override leaves unset.
fn build_rule(
    kind: RuleKind,
    ov: &RuleOverride,
    existing: Option<&PolicyRule>,
) -> GuardrailResult<PolicyRule> {
    let label = format!("{}:{}", kind, ov.display_name());

    let rule = match kind {
        RuleKind::Topic => {
            let base = match existing {
                Some(PolicyRule::Topic(t)) => Some(t),
                _ => None,
            };
            let name = required_field(ov.name.as_deref(), "name", kind)?.to_string();
            let definition = match (ov.definition.as_deref(), base) {
                (Some(d), _) => d.to_string(),
                (None, Some(b)) => b.definition.clone(),
                (None, None) => {
                    return Err(compilation(format!("topic '{name}' needs a definition")));
                }
            };
            let examples = ov
                .examples
                .clone()
                .or_else(|| base.map(|b| b.examples.clone()))
                .unwrap_or_default();
            let (input, output) = directions(&label, ov, base.map(|b| (b.input, b.output)))?;
            PolicyRule::Topic(TopicRule {
                name,
                definition,
                examples,
                topic_type: TopicType::Deny,
                input,
                output,
            })
        }

        RuleKind::Word => {
            let base = match existing {
                Some(PolicyRule::Word(w)) => Some(w),
                _ => None,
            };
            let text = required_field(ov.text.as_deref().or(ov.name.as_deref()), "text", kind)?;
            let (input, output) = directions(&label, ov, base.map(|b| (b.input, b.output)))?;
            PolicyRule::Word(WordRule { text: text.to_string(), input, output })
        }

        RuleKind::PiiEntity => {
            let base = match existing {
                Some(PolicyRule::PiiEntity(p)) => Some(p),
                _ => None,
            };
            let value = required_field(ov.rule_type.as_deref(), "type", kind)?;
            let entity_type = parse_enum("PII entity type", value, &label)?;
            let (input, output) = directions(&label, ov, base.map(|b| (b.input, b.output)))?;
            PolicyRule::PiiEntity(PiiEntityRule { entity_type, input, output })
        }

        RuleKind::Regex => {
            let base = match existing {
                Some(PolicyRule::Regex(r)) => Some(r),
                _ => None,
            };
            let name = required_field(ov.name.as_deref(), "name", kind)?.to_string();
            let pattern = match (ov.pattern.as_deref(), base) {
                (Some(p), _) => p.to_string(),
                (None, Some(b)) => b.pattern.clone(),
                (None, None) => {
                    return Err(compilation(format!("regex '{name}' needs a pattern")));
                }
            };
            Regex::new(&pattern)
                .map_err(|e| compilation(format!("invalid pattern for regex '{name}': {e}")))?;
            let description = ov
                .description
                .clone()
                .or_else(|| base.and_then(|b| b.description.clone()));
            let (input, output) = directions(&label, ov, base.map(|b| (b.input, b.output)))?;
            PolicyRule::Regex(RegexRule { name, pattern, description, input, output })
        }

        RuleKind::ContentFilter => {
            let base = match existing {
                Some(PolicyRule::ContentFilter(c)) => Some(c),
                _ => None,
            };
            let value = required_field(ov.rule_type.as_deref(), "type", kind)?;
            let filter_type = parse_enum("content filter type", value, &label)?;
            let input_strength = strength(
                &label,
                ov.input_strength.as_deref(),
                base.map(|b| b.input_strength),
            )?;
            let output_strength = strength(
                &label,
                ov.output_strength.as_deref(),
                base.map(|b| b.output_strength),
            )?;
            let (input, output) = directions(&label, ov, base.map(|b| (b.input, b.output)))?;
            PolicyRule::ContentFilter(ContentFilterRule {
                filter_type,
                input_strength,
                output_strength,
                input,
                output,
            })
        }

        RuleKind::GroundingFilter => {
            let base = match existing {
                Some(PolicyRule::GroundingFilter(g)) => Some(g),
                _ => None,
            };
            let value = required_field(ov.rule_type.as_deref(), "type", kind)?;
            let filter_type = parse_enum("grounding filter type", value, &label)?;
            let threshold = match (ov.threshold, base) {
                (Some(t), _) => t,
                (None, Some(b)) => b.threshold,
                (None, None) => {
                    return Err(compilation(format!("{label} needs a threshold")));
                }
            };
            if !(0.0..1.0).contains(&threshold) {
                return Err(compilation(format!(
                    "threshold {threshold} for {label} is outside [0, 1)"
                )));
            }
            let action = match ov.output_action.as_deref().or(ov.action.as_deref()) {
                Some(a) => parse_enum("action", a, &label)?,
                None => base.map(|b| b.action).unwrap_or(Action::Block),
            };
            let enabled = ov
                .output_enabled
                .or(ov.enabled)
                .or(base.map(|b| b.enabled))
                .unwrap_or(true);
            PolicyRule::GroundingFilter(GroundingFilterRule {
                filter_type,
                threshold,
                enabled,
                action,
            })
        }
    };

    Ok(rule)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> PolicyCompiler {
        PolicyCompiler::new(Catalog::banking(), CompilerOptions::default())
    }

    fn overrides(toml: &str) -> PolicyOverrides {
        PolicyOverrides::from_toml_str(toml).unwrap()
    }

    fn expect_compilation_error(result: GuardrailResult<PolicyDocument>, needle: &str) {
        match result {
            Err(GuardrailError::Compilation { reason }) => assert!(
                reason.contains(needle),
                "expected '{needle}' in reason, got: {reason}"
            ),
            other => panic!("expected Compilation error, got {:?}", other),
        }
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    /// With no overrides the document mirrors the catalog and config defaults.
    #[test]
    fn test_compile_without_overrides() {
        let doc = compiler().compile(&PolicyOverrides::default()).unwrap();

        assert_eq!(doc.name, "BankingVoiceBotGuardrail");
        assert_eq!(doc.description, crate::catalog::DEFAULT_DESCRIPTION);
        assert_eq!(doc.content_policy.as_ref().unwrap().rules.len(), 5);
        assert_eq!(doc.word_policy.as_ref().unwrap().rules.len(), 24);
        assert_eq!(doc.topic_policy.as_ref().unwrap().rules.len(), 5);
        assert_eq!(doc.sensitive_information_policy.as_ref().unwrap().rules.len(), 8);
        assert_eq!(doc.contextual_grounding_policy.as_ref().unwrap().rules.len(), 2);
        assert_eq!(doc.kms_key_id, None);
        assert_eq!(doc.rule_count(), 44);
    }

    /// The same inputs serialize to identical bytes.
    #[test]
    fn test_compile_is_deterministic() {
        let ov = overrides(
            r#"
            name = "bot"
            [tags]
            zeta = "1"
            alpha = "2"
            [[rules]]
            kind = "word"
            text = "crypto wallet"
            "#,
        );
        let a = compiler().compile(&ov).unwrap().to_canonical_json().unwrap();
        let b = compiler().compile(&ov).unwrap().to_canonical_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_catalog_is_not_mutated() {
        let compiler = compiler();
        compiler
            .compile(&overrides(
                r#"
                [[remove]]
                kind = "topic"
                name = "Financial Advice"
                "#,
            ))
            .unwrap();
        assert_eq!(compiler.catalog(), &Catalog::banking());
    }

    #[test]
    fn test_config_supplies_key_and_name() {
        let config = GuardrailConfig {
            base_name: "RetailBot".to_string(),
            kms_key_id: Some("alias/retail".to_string()),
            ..GuardrailConfig::default()
        };
        let doc = PolicyCompiler::banking(&config)
            .compile(&PolicyOverrides::default())
            .unwrap();
        assert_eq!(doc.name, "RetailBot");
        assert_eq!(doc.kms_key_id.as_deref(), Some("alias/retail"));

        let doc = PolicyCompiler::banking(&config)
            .compile(&PolicyOverrides::default().with_kms_key("alias/override"))
            .unwrap();
        assert_eq!(doc.kms_key_id.as_deref(), Some("alias/override"));
    }

    // ── Replace and append ────────────────────────────────────────────────────

    /// An override naming a catalog rule replaces it at the same position and
    /// inherits the fields it does not set.
    #[test]
    fn test_override_replaces_in_place() {
        let doc = compiler()
            .compile(&overrides(
                r#"
                [[rules]]
                kind = "content_filter"
                type = "insults"
                input_strength = "MEDIUM"
                "#,
            ))
            .unwrap();

        let rules = &doc.content_policy.unwrap().rules;
        assert_eq!(rules.len(), 5);
        match &rules[1] {
            PolicyRule::ContentFilter(c) => {
                assert_eq!(c.filter_type, ContentFilterType::Insults);
                assert_eq!(c.input_strength, FilterStrength::Medium);
                assert_eq!(c.output_strength, FilterStrength::High);
                assert_eq!(c.output, DirectionPolicy::BLOCK);
            }
            other => panic!("expected INSULTS content filter, got {:?}", other),
        }
    }

    /// Word matching ignores case, so "iban" replaces the catalog "IBAN".
    #[test]
    fn test_word_override_matches_case_insensitively() {
        let doc = compiler()
            .compile(&overrides(
                r#"
                [[rules]]
                kind = "WORD"
                text = "iban"
                output_enabled = false
                "#,
            ))
            .unwrap();
        let words = &doc.word_policy.unwrap().rules;
        assert_eq!(words.len(), 24);
        match &words[7] {
            PolicyRule::Word(w) => {
                assert_eq!(w.text, "iban");
                assert!(!w.output.enabled);
                assert!(w.input.enabled);
            }
            other => panic!("expected word rule, got {:?}", other),
        }
    }

    /// New rules are appended after the catalog rules, in override order.
    #[test]
    fn test_new_rules_appended_in_order() {
        let doc = compiler()
            .compile(&overrides(
                r#"
                [[rules]]
                kind = "topic"
                name = "Cryptocurrency"
                definition = "Speculative crypto-asset trading"
                examples = ["should I buy bitcoin"]

                [[rules]]
                kind = "topic"
                name = "Loan Guarantees"
                definition = "Promises of guaranteed loan approval"
                "#,
            ))
            .unwrap();

        let names: Vec<String> = doc
            .topic_policy
            .unwrap()
            .rules
            .iter()
            .map(|r| r.identity())
            .collect();
        assert_eq!(names.len(), 7);
        assert_eq!(names[0], "Financial Fraud");
        assert_eq!(names[5], "Cryptocurrency");
        assert_eq!(names[6], "Loan Guarantees");
    }

    #[test]
    fn test_overrides_and_tags_merge() {
        let doc = compiler()
            .compile(&overrides(
                r#"
                name = "bot-eu"
                blocked_input_messaging = "Blocked."
                [tags]
                environment = "staging"
                region = "eu"
                "#,
            ))
            .unwrap();
        assert_eq!(doc.name, "bot-eu");
        assert_eq!(doc.blocked_input_messaging, "Blocked.");
        assert_eq!(doc.blocked_outputs_messaging, crate::catalog::DEFAULT_BLOCKED_OUTPUTS_MESSAGING);
        assert_eq!(doc.tags["environment"], "staging");
        assert_eq!(doc.tags["region"], "eu");
        assert_eq!(doc.tags["compliance"], "pci-dss");
    }

    // ── Removal ───────────────────────────────────────────────────────────────

    #[test]
    fn test_removing_every_grounding_filter_drops_the_group() {
        let doc = compiler()
            .compile(&overrides(
                r#"
                [[remove]]
                kind = "grounding_filter"
                name = "GROUNDING"
                [[remove]]
                kind = "grounding_filter"
                name = "relevance"
                "#,
            ))
            .unwrap();
        assert!(doc.contextual_grounding_policy.is_none());
    }

    #[test]
    fn test_removing_missing_rule_fails() {
        let result = compiler().compile(&overrides(
            r#"
            [[remove]]
            kind = "topic"
            name = "Astrology"
            "#,
        ));
        expect_compilation_error(result, "Astrology");
    }

    // ── Rejections ────────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_kind_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "sentiment"
            name = "angry"
            "#,
        ));
        expect_compilation_error(result, "unknown rule kind 'sentiment'");
    }

    #[test]
    fn test_unknown_content_filter_type_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "content_filter"
            type = "SPAM"
            "#,
        ));
        expect_compilation_error(result, "unknown content filter type 'SPAM'");
    }

    #[test]
    fn test_unknown_pii_entity_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "pii_entity"
            type = "MOTHERS_MAIDEN_NAME"
            "#,
        ));
        expect_compilation_error(result, "unknown PII entity type");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "word"
            text = "bearer bond"
            action = "QUARANTINE"
            "#,
        ));
        expect_compilation_error(result, "unknown action 'QUARANTINE'");
    }

    #[test]
    fn test_unknown_strength_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "content_filter"
            type = "HATE"
            input_strength = "EXTREME"
            "#,
        ));
        expect_compilation_error(result, "unknown filter strength 'EXTREME'");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "regex"
            name = "IBAN"
            pattern = "[A-Z{2"
            "#,
        ));
        expect_compilation_error(result, "invalid pattern for regex 'IBAN'");
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        for threshold in ["1.0", "-0.1"] {
            let result = compiler().compile(&overrides(&format!(
                "[[rules]]\nkind = \"grounding_filter\"\ntype = \"GROUNDING\"\nthreshold = {threshold}\n"
            )));
            expect_compilation_error(result, "outside [0, 1)");
        }
    }

    #[test]
    fn test_new_topic_requires_definition() {
        let result = compiler().compile(&overrides(
            r#"
            [[rules]]
            kind = "topic"
            name = "Gambling"
            "#,
        ));
        expect_compilation_error(result, "needs a definition");
    }
}
