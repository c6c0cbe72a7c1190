//! Caller overrides and their TOML schema.
//!
//! Overrides are deserialized from TOML and merged onto the catalog by the
//! compiler. Every enum-valued field is kept as a plain string here so that
//! unknown names surface as compilation errors naming the offending rule,
//! rather than as opaque TOML parse failures.
//!
//! Example:
//! ```toml
//! name = "BankingVoiceBotGuardrail-eu"
//! kms_key_id = "alias/bedrock-guardrail-key"
//!
//! [tags]
//! region = "eu"
//!
//! [[rules]]
//! kind = "content_filter"
//! type = "VIOLENCE"
//! input_strength = "MEDIUM"
//!
//! [[rules]]
//! kind = "word"
//! text = "crypto wallet"
//!
//! [[remove]]
//! kind = "topic"
//! name = "Financial Advice"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use guardrail_contracts::error::{GuardrailError, GuardrailResult};

/// Everything a caller may change about the compiled document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub blocked_input_messaging: Option<String>,
    pub blocked_outputs_messaging: Option<String>,
    pub kms_key_id: Option<String>,

    /// Merged over the catalog tags; a key named here replaces the catalog value.
    pub tags: BTreeMap<String, String>,

    /// Rules to add, or to replace when they name an existing catalog rule.
    pub rules: Vec<RuleOverride>,

    /// Catalog rules to drop.
    pub remove: Vec<RuleRef>,
}

/// One added or replacing rule.
///
/// Which fields apply depends on `kind`. When the rule replaces a catalog
/// rule, unspecified fields keep the catalog's values; a brand-new rule falls
/// back to enabled/`BLOCK` in both directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOverride {
    /// `topic`, `word`, `pii_entity`, `regex`, `content_filter`, or `grounding_filter`.
    pub kind: String,

    /// Topic or regex name.
    pub name: Option<String>,

    /// Word text.
    pub text: Option<String>,

    /// Content-filter, PII-entity, or grounding-filter type.
    #[serde(rename = "type")]
    pub rule_type: Option<String>,

    pub definition: Option<String>,
    pub examples: Option<Vec<String>>,
    pub pattern: Option<String>,
    pub description: Option<String>,
    pub threshold: Option<f64>,
    pub input_strength: Option<String>,
    pub output_strength: Option<String>,

    /// Applies to both directions unless a direction-specific value is given.
    pub action: Option<String>,
    pub input_action: Option<String>,
    pub output_action: Option<String>,

    /// Applies to both directions unless a direction-specific value is given.
    pub enabled: Option<bool>,
    pub input_enabled: Option<bool>,
    pub output_enabled: Option<bool>,
}

/// Identifies a catalog rule to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleRef {
    pub kind: String,
    /// Topic/regex name, word text, or filter/entity type.
    pub name: String,
}

impl PolicyOverrides {
    /// Parse `s` as TOML overrides.
    pub fn from_toml_str(s: &str) -> GuardrailResult<Self> {
        toml::from_str(s).map_err(|e| GuardrailError::Config {
            reason: format!("failed to parse policy overrides TOML: {}", e),
        })
    }

    /// Read the overrides file at `path`.
    pub fn from_file(path: &Path) -> GuardrailResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GuardrailError::Config {
            reason: format!("failed to read overrides file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kms_key(mut self, key_ref: impl Into<String>) -> Self {
        self.kms_key_id = Some(key_ref.into());
        self
    }
}

impl RuleOverride {
    /// The user-facing name the override was keyed on, for error messages.
    pub(crate) fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.text.as_deref())
            .or(self.rule_type.as_deref())
            .unwrap_or("<unnamed>")
    }
}
