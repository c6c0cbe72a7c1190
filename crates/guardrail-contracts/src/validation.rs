//! Validation report types.
//!
//! The validator never stops at the first business-rule failure: every
//! violation is collected so operators see the whole picture in one pass.

use serde::{Deserialize, Serialize};

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable identifier of the check that failed, e.g. `required-field`.
    pub rule_id: String,
    /// Human-readable explanation.
    pub message: String,
}

impl Violation {
    pub fn new(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { rule_id: rule_id.into(), message: message.into() }
    }
}

/// Outcome of validating one policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(violations)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(v) => v,
        }
    }
}
