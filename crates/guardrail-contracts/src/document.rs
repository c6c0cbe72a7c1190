//! The compiled policy document.
//!
//! A `PolicyDocument` is produced once per deployment run by the compiler and
//! handed by shared reference to the validator and the reconciler. Nothing
//! downstream mutates it; changing a field means compiling a new document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::rule::{PolicyRule, RuleKind};

/// The rule groups a document can carry, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum GroupKind {
    ContentPolicy,
    WordPolicy,
    TopicPolicy,
    SensitiveInformationPolicy,
    ContextualGroundingPolicy,
}

impl GroupKind {
    pub const ALL: [GroupKind; 5] = [
        GroupKind::ContentPolicy,
        GroupKind::WordPolicy,
        GroupKind::TopicPolicy,
        GroupKind::SensitiveInformationPolicy,
        GroupKind::ContextualGroundingPolicy,
    ];

    /// Groups that must be present and non-empty in every document.
    pub const REQUIRED: [GroupKind; 3] =
        [GroupKind::ContentPolicy, GroupKind::WordPolicy, GroupKind::TopicPolicy];

    /// The field name this group is serialized under.
    pub fn field_name(self) -> &'static str {
        self.into()
    }

    /// Whether a rule of `kind` belongs in this group.
    pub fn accepts(self, kind: RuleKind) -> bool {
        matches!(
            (self, kind),
            (GroupKind::ContentPolicy, RuleKind::ContentFilter)
                | (GroupKind::WordPolicy, RuleKind::Word)
                | (GroupKind::TopicPolicy, RuleKind::Topic)
                | (GroupKind::SensitiveInformationPolicy, RuleKind::PiiEntity)
                | (GroupKind::SensitiveInformationPolicy, RuleKind::Regex)
                | (GroupKind::ContextualGroundingPolicy, RuleKind::GroundingFilter)
        )
    }

    /// The group a rule of `kind` is compiled into.
    pub fn for_rule(kind: RuleKind) -> GroupKind {
        match kind {
            RuleKind::ContentFilter => GroupKind::ContentPolicy,
            RuleKind::Word => GroupKind::WordPolicy,
            RuleKind::Topic => GroupKind::TopicPolicy,
            RuleKind::PiiEntity | RuleKind::Regex => GroupKind::SensitiveInformationPolicy,
            RuleKind::GroundingFilter => GroupKind::ContextualGroundingPolicy,
        }
    }
}

/// An ordered list of rules of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub rules: Vec<PolicyRule>,
}

impl RuleGroup {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The full declarative ruleset submitted to the remote policy service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Shown to the user when their input is blocked.
    pub blocked_input_messaging: String,

    /// Shown to the user when the model's output is blocked.
    pub blocked_outputs_messaging: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_policy: Option<RuleGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_policy: Option<RuleGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_policy: Option<RuleGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_information_policy: Option<RuleGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contextual_grounding_policy: Option<RuleGroup>,

    /// Key-service identifier used by the remote service to encrypt the
    /// resource at rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl PolicyDocument {
    pub fn group(&self, kind: GroupKind) -> Option<&RuleGroup> {
        match kind {
            GroupKind::ContentPolicy => self.content_policy.as_ref(),
            GroupKind::WordPolicy => self.word_policy.as_ref(),
            GroupKind::TopicPolicy => self.topic_policy.as_ref(),
            GroupKind::SensitiveInformationPolicy => self.sensitive_information_policy.as_ref(),
            GroupKind::ContextualGroundingPolicy => self.contextual_grounding_policy.as_ref(),
        }
    }

    /// Iterate the groups that are present, in submission order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupKind, &RuleGroup)> {
        GroupKind::ALL
            .into_iter()
            .filter_map(move |kind| self.group(kind).map(|g| (kind, g)))
    }

    /// Total number of rules across every present group.
    pub fn rule_count(&self) -> usize {
        self.groups().map(|(_, g)| g.rules.len()).sum()
    }

    /// Compact JSON form. Field order is fixed by the struct declaration and
    /// tags are a sorted map, so equal documents always produce equal bytes.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
