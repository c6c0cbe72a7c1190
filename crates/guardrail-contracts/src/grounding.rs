//! Contextual grounding verdict types.
//!
//! A `GroundingVerdict` is produced fresh for every (response, context) pair
//! and handed back to the calling application. It is never persisted.

use serde::{Deserialize, Serialize};
use strum::Display;

/// The heuristic checks the grounding evaluator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroundingCheck {
    FactualConsistency,
    TemporalConsistency,
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: GroundingCheck,
    pub passed: bool,
    /// Present only when the check failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Combined result of every grounding check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingVerdict {
    /// True only if every check passed.
    pub is_grounded: bool,
    pub checks: Vec<CheckOutcome>,
    /// One human-readable line per failed check.
    pub warnings: Vec<String>,
}

impl GroundingVerdict {
    pub fn outcome(&self, check: GroundingCheck) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.check == check)
    }
}
