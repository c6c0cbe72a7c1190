//! The banking policy catalog.
//!
//! Static defaults for a customer-facing banking voice assistant. The
//! compiler starts from a [`Catalog`] and layers caller overrides on top; the
//! catalog itself is never modified.
//!
//! Declaration order matters: rules inside a compiled group appear in the
//! order they are listed here.

use std::collections::BTreeMap;

use guardrail_contracts::rule::{
    Action, ContentFilterRule, ContentFilterType, DirectionPolicy, FilterStrength,
    GroundingFilterRule, GroundingFilterType, PiiEntityRule, PiiEntityType, PolicyRule,
    RegexRule, TopicRule, TopicType, WordRule,
};

pub const DEFAULT_DESCRIPTION: &str =
    "Comprehensive guardrail for banking voice bot with enhanced security and compliance";

pub const DEFAULT_BLOCKED_INPUT_MESSAGING: &str = "I'm sorry, but I can't process that request. \
     For security reasons, certain actions require additional verification.";

pub const DEFAULT_BLOCKED_OUTPUTS_MESSAGING: &str = "I'm sorry, but I can't provide that \
     information through this channel. Please contact customer service for assistance.";

/// Words and phrases blocked in both directions.
pub const SENSITIVE_TERMS: [&str; 24] = [
    "password",
    "passcode",
    "security code",
    "one-time password",
    "MFA code",
    "wire transfer",
    "SWIFT code",
    "IBAN",
    "account balance",
    "overdraft",
    "account holder",
    "signature",
    "government ID",
    "driver's license",
    "passport number",
    "credit card number",
    "CVV",
    "expiration date",
    "social security number",
    "SSN",
    "routing number",
    "account number",
    "PIN",
    "personal identification number",
];

/// A complete set of default rules plus the document-level defaults that go
/// with them.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub rules: Vec<PolicyRule>,
    pub description: String,
    pub blocked_input_messaging: String,
    pub blocked_outputs_messaging: String,
    pub tags: BTreeMap<String, String>,
}

impl Catalog {
    /// The banking voice-assistant catalog.
    pub fn banking() -> Self {
        let mut rules = Vec::new();
        rules.extend(content_filters());
        rules.extend(words());
        rules.extend(topics());
        rules.extend(pii_entities());
        rules.extend(regexes());
        rules.extend(grounding_filters());

        Self {
            rules,
            description: DEFAULT_DESCRIPTION.to_string(),
            blocked_input_messaging: DEFAULT_BLOCKED_INPUT_MESSAGING.to_string(),
            blocked_outputs_messaging: DEFAULT_BLOCKED_OUTPUTS_MESSAGING.to_string(),
            tags: default_tags(),
        }
    }

    /// Find a rule by its label, e.g. `WORD:iban`.
    pub fn find(&self, label: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.label() == label)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::banking()
    }
}

fn default_tags() -> BTreeMap<String, String> {
    [
        ("environment", "production"),
        ("department", "customer_service"),
        ("compliance", "pci-dss"),
        ("managed_by", "security_team"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

// ── Content filters ───────────────────────────────────────────────────────────

fn content_filters() -> Vec<PolicyRule> {
    let high = |filter_type| {
        PolicyRule::ContentFilter(ContentFilterRule {
            filter_type,
            input_strength: FilterStrength::High,
            output_strength: FilterStrength::High,
            input: DirectionPolicy::BLOCK,
            output: DirectionPolicy::BLOCK,
        })
    };

    vec![
        high(ContentFilterType::Hate),
        high(ContentFilterType::Insults),
        // Prompt attacks only make sense on user input.
        PolicyRule::ContentFilter(ContentFilterRule {
            filter_type: ContentFilterType::PromptAttack,
            input_strength: FilterStrength::High,
            output_strength: FilterStrength::None,
            input: DirectionPolicy::BLOCK,
            output: DirectionPolicy::OFF,
        }),
        high(ContentFilterType::Sexual),
        high(ContentFilterType::Violence),
    ]
}

// ── Words ─────────────────────────────────────────────────────────────────────

fn words() -> Vec<PolicyRule> {
    SENSITIVE_TERMS
        .iter()
        .map(|term| {
            PolicyRule::Word(WordRule {
                text: term.to_string(),
                input: DirectionPolicy::BLOCK,
                output: DirectionPolicy::BLOCK,
            })
        })
        .collect()
}

// ── Topics ────────────────────────────────────────────────────────────────────

fn topics() -> Vec<PolicyRule> {
    let deny = |name: &str, definition: &str, examples: [&str; 3]| {
        PolicyRule::Topic(TopicRule {
            name: name.to_string(),
            definition: definition.to_string(),
            examples: examples.iter().map(|e| e.to_string()).collect(),
            topic_type: TopicType::Deny,
            input: DirectionPolicy::BLOCK,
            output: DirectionPolicy::BLOCK,
        })
    };

    vec![
        deny(
            "Financial Fraud",
            "Discussions about fraudulent activities or scams",
            ["how to commit fraud", "bypass security measures", "scam techniques"],
        ),
        deny(
            "Personal Information",
            "Requests for personal or sensitive information",
            ["what is my SSN", "tell me my account balance", "change my password"],
        ),
        deny(
            "Financial Advice",
            "Providing financial or investment advice",
            ["should I invest in", "is this a good stock", "financial planning advice"],
        ),
        deny(
            "Harmful Content",
            "Content that promotes harm or illegal activities",
            ["how to launder money", "illegal transactions", "bypass KYC"],
        ),
        deny(
            "Sensitive Operations",
            "High-risk banking operations that require additional verification",
            ["wire transfer", "change account details", "update contact information"],
        ),
    ]
}

// ── Sensitive information ─────────────────────────────────────────────────────

fn pii_entities() -> Vec<PolicyRule> {
    [
        PiiEntityType::UsSocialSecurityNumber,
        PiiEntityType::CreditDebitCardNumber,
        PiiEntityType::UsBankAccountNumber,
        PiiEntityType::UsBankRoutingNumber,
        PiiEntityType::UsIndividualTaxIdentificationNumber,
    ]
    .into_iter()
    .map(|entity_type| {
        PolicyRule::PiiEntity(PiiEntityRule {
            entity_type,
            input: DirectionPolicy::BLOCK,
            output: DirectionPolicy::BLOCK,
        })
    })
    .collect()
}

fn regexes() -> Vec<PolicyRule> {
    let block = |name: &str, pattern: &str, description: &str| {
        PolicyRule::Regex(RegexRule {
            name: name.to_string(),
            pattern: pattern.to_string(),
            description: Some(description.to_string()),
            input: DirectionPolicy::BLOCK,
            output: DirectionPolicy::BLOCK,
        })
    };

    vec![
        block(
            "Credit Card Number",
            r"\b(?:\d[ -]*?){13,16}\b",
            "Detects credit card numbers",
        ),
        block("SSN", r"\b\d{3}[-\.]?\d{2}[-\.]?\d{4}\b", "Detects Social Security Numbers"),
        block(
            "Bank Account Number",
            r"\b\d{8,17}\b",
            "Detects potential bank account numbers",
        ),
    ]
}

// ── Contextual grounding ──────────────────────────────────────────────────────

fn grounding_filters() -> Vec<PolicyRule> {
    [(GroundingFilterType::Grounding, 0.8), (GroundingFilterType::Relevance, 0.7)]
        .into_iter()
        .map(|(filter_type, threshold)| {
            PolicyRule::GroundingFilter(GroundingFilterRule {
                filter_type,
                threshold,
                enabled: true,
                action: Action::Block,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use guardrail_contracts::rule::RuleKind;

    use super::*;

    fn count(catalog: &Catalog, kind: RuleKind) -> usize {
        catalog.rules.iter().filter(|r| r.kind() == kind).count()
    }

    #[test]
    fn banking_catalog_has_expected_rule_counts() {
        let catalog = Catalog::banking();
        assert_eq!(count(&catalog, RuleKind::ContentFilter), 5);
        assert_eq!(count(&catalog, RuleKind::Word), 24);
        assert_eq!(count(&catalog, RuleKind::Topic), 5);
        assert_eq!(count(&catalog, RuleKind::PiiEntity), 5);
        assert_eq!(count(&catalog, RuleKind::Regex), 3);
        assert_eq!(count(&catalog, RuleKind::GroundingFilter), 2);
    }

    #[test]
    fn catalog_actions_lie_in_allowed_sets() {
        for rule in Catalog::banking().rules {
            for (direction, action) in rule.actions() {
                assert!(
                    rule.kind().allowed_actions().contains(&action),
                    "{} has disallowed {direction} action {action}",
                    rule.label()
                );
            }
        }
    }

    #[test]
    fn prompt_attack_is_input_only() {
        let catalog = Catalog::banking();
        match catalog.find("CONTENT_FILTER:PROMPT_ATTACK") {
            Some(PolicyRule::ContentFilter(rule)) => {
                assert!(!rule.output.enabled);
                assert_eq!(rule.output_strength, FilterStrength::None);
                assert_eq!(rule.input_strength, FilterStrength::High);
            }
            other => panic!("expected PROMPT_ATTACK content filter, got {:?}", other),
        }
    }

    #[test]
    fn regex_patterns_compile() {
        for rule in Catalog::banking().rules {
            if let PolicyRule::Regex(r) = rule {
                assert!(regex::Regex::new(&r.pattern).is_ok(), "bad pattern in {}", r.name);
            }
        }
    }

    #[test]
    fn default_tags_mark_compliance_scope() {
        let catalog = Catalog::banking();
        assert_eq!(catalog.tags.len(), 4);
        assert_eq!(catalog.tags["compliance"], "pci-dss");
    }
}
