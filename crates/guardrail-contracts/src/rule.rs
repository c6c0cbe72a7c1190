//! Policy rule types.
//!
//! Every rule the remote service understands is one variant of [`PolicyRule`].
//! Actions, strengths, and filter/entity types are finite enums so that the
//! compiler can reject unknown names instead of forwarding free-form strings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// What the service does when a rule matches in one direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Action {
    Block,
    Warn,
    None,
}

/// Classifier sensitivity for a content filter direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FilterStrength {
    None,
    Low,
    Medium,
    High,
}

/// Content categories the remote classifier can filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ContentFilterType {
    Hate,
    Insults,
    Sexual,
    Violence,
    Misconduct,
    PromptAttack,
}

/// PII entity types the remote service can detect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PiiEntityType {
    Address,
    Age,
    Name,
    Email,
    Phone,
    Username,
    Password,
    DriverId,
    Pin,
    CreditDebitCardCvv,
    CreditDebitCardExpiry,
    CreditDebitCardNumber,
    InternationalBankAccountNumber,
    SwiftCode,
    IpAddress,
    UsPassportNumber,
    UsSocialSecurityNumber,
    UsBankAccountNumber,
    UsBankRoutingNumber,
    UsIndividualTaxIdentificationNumber,
    UkNationalInsuranceNumber,
    CaSocialInsuranceNumber,
}

/// Contextual grounding score filters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum GroundingFilterType {
    Grounding,
    Relevance,
}

/// Topic policies only support denylisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicType {
    #[default]
    Deny,
}

/// Discriminant of a [`PolicyRule`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RuleKind {
    Topic,
    Word,
    PiiEntity,
    Regex,
    ContentFilter,
    GroundingFilter,
}

impl RuleKind {
    /// Actions the remote service accepts for rules of this kind.
    pub fn allowed_actions(self) -> &'static [Action] {
        match self {
            RuleKind::PiiEntity | RuleKind::Regex => &[Action::Block, Action::Warn, Action::None],
            RuleKind::Topic
            | RuleKind::Word
            | RuleKind::ContentFilter
            | RuleKind::GroundingFilter => &[Action::Block, Action::None],
        }
    }
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Enabled flag and action for one direction of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionPolicy {
    pub enabled: bool,
    pub action: Action,
}

impl DirectionPolicy {
    pub const BLOCK: DirectionPolicy = DirectionPolicy { enabled: true, action: Action::Block };
    pub const OFF: DirectionPolicy = DirectionPolicy { enabled: false, action: Action::None };
}

/// A denied conversation topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRule {
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default, rename = "type")]
    pub topic_type: TopicType,
    pub input: DirectionPolicy,
    pub output: DirectionPolicy,
}

/// An exact word or phrase to block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRule {
    pub text: String,
    pub input: DirectionPolicy,
    pub output: DirectionPolicy,
}

/// A managed PII detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiEntityRule {
    pub entity_type: PiiEntityType,
    pub input: DirectionPolicy,
    pub output: DirectionPolicy,
}

/// A caller-defined sensitive-information pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input: DirectionPolicy,
    pub output: DirectionPolicy,
}

/// A harmful-content classifier setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilterRule {
    pub filter_type: ContentFilterType,
    pub input_strength: FilterStrength,
    pub output_strength: FilterStrength,
    pub input: DirectionPolicy,
    pub output: DirectionPolicy,
}

/// A contextual grounding score threshold.
///
/// `threshold` lies in `[0.0, 1.0)`; responses scoring below it are acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingFilterRule {
    pub filter_type: GroundingFilterType,
    pub threshold: f64,
    pub enabled: bool,
    pub action: Action,
}

/// One atomic rule of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyRule {
    Topic(TopicRule),
    Word(WordRule),
    PiiEntity(PiiEntityRule),
    Regex(RegexRule),
    ContentFilter(ContentFilterRule),
    GroundingFilter(GroundingFilterRule),
}

impl PolicyRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            PolicyRule::Topic(_) => RuleKind::Topic,
            PolicyRule::Word(_) => RuleKind::Word,
            PolicyRule::PiiEntity(_) => RuleKind::PiiEntity,
            PolicyRule::Regex(_) => RuleKind::Regex,
            PolicyRule::ContentFilter(_) => RuleKind::ContentFilter,
            PolicyRule::GroundingFilter(_) => RuleKind::GroundingFilter,
        }
    }

    /// The name or type that identifies this rule within its kind.
    ///
    /// Two rules with the same kind and identity describe the same control;
    /// the compiler uses this to replace catalog rules in place.
    pub fn identity(&self) -> String {
        match self {
            PolicyRule::Topic(t) => t.name.clone(),
            PolicyRule::Word(w) => w.text.to_lowercase(),
            PolicyRule::PiiEntity(p) => p.entity_type.to_string(),
            PolicyRule::Regex(r) => r.name.clone(),
            PolicyRule::ContentFilter(c) => c.filter_type.to_string(),
            PolicyRule::GroundingFilter(g) => g.filter_type.to_string(),
        }
    }

    /// Stable label used in violation reports, e.g. `CONTENT_FILTER:PROMPT_ATTACK`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind(), self.identity())
    }

    /// The configured action for every direction this rule carries.
    pub fn actions(&self) -> Vec<(Direction, Action)> {
        match self {
            PolicyRule::Topic(TopicRule { input, output, .. })
            | PolicyRule::Word(WordRule { input, output, .. })
            | PolicyRule::PiiEntity(PiiEntityRule { input, output, .. })
            | PolicyRule::Regex(RegexRule { input, output, .. })
            | PolicyRule::ContentFilter(ContentFilterRule { input, output, .. }) => {
                vec![(Direction::Input, input.action), (Direction::Output, output.action)]
            }
            // Grounding is scored on model output only.
            PolicyRule::GroundingFilter(g) => vec![(Direction::Output, g.action)],
        }
    }
}
