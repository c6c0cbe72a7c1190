//! `GroundingEvaluator`: local consistency checks between a response and
//! the context it was generated from.
//!
//! Both checks compare literal token sets. Nothing is normalized:
//! "10" and "10.0" are different numbers, and "Jan 5, 2024" and
//! "2024-01-05" are different dates.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use guardrail_contracts::grounding::{CheckOutcome, GroundingCheck, GroundingVerdict};

/// Financial terms a response may only mention if the context does.
pub const FINANCIAL_TERMS: [&str; 8] = [
    "interest rate",
    "APR",
    "APY",
    "fee",
    "penalty",
    "balance",
    "withdrawal",
    "deposit",
];

pub const NUMBERS_NOT_IN_CONTEXT: &str = "Response contains numbers not present in context";
pub const DATES_NOT_IN_CONTEXT: &str = "Response introduces dates not present in context";

/// Integers and decimals, with a trailing `%` kept as part of the token.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?(?:%|\b)").unwrap());

/// Month-name dates ("Jan 5, 2024", "March 3rd 2025"), ISO dates, and
/// day/month/year with `/` or `-`.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
        \b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?
           |aug(?:ust)?|sep(?:tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)
           \s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b
        | \b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b
        | \b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b
        ",
    )
    .unwrap()
});

/// Numeric tokens in `text`.
pub fn extract_numbers(text: &str) -> BTreeSet<&str> {
    NUMBER_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Date-like substrings in `text`.
pub fn extract_dates(text: &str) -> BTreeSet<&str> {
    DATE_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Runs the factual and temporal checks. Stateless apart from its term list;
/// one evaluator can serve any number of calls.
#[derive(Debug, Clone)]
pub struct GroundingEvaluator {
    /// Lowercased once so matching is a plain substring search.
    terms: Vec<String>,
}

impl GroundingEvaluator {
    /// Evaluator with the banking term list.
    pub fn new() -> Self {
        Self::with_terms(FINANCIAL_TERMS)
    }

    pub fn with_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms.into_iter().map(|t| t.as_ref().to_lowercase()).collect(),
        }
    }

    /// Run every check. Never fails; text with nothing recognizable simply
    /// yields no tokens.
    pub fn evaluate(&self, response: &str, context: &str) -> GroundingVerdict {
        let checks = vec![
            self.check_factual(response, context),
            check_temporal(response, context),
        ];

        let warnings = checks
            .iter()
            .filter_map(|c| {
                c.reason.as_ref().map(|reason| match c.check {
                    GroundingCheck::FactualConsistency => {
                        format!("Factual inconsistency detected: {reason}")
                    }
                    GroundingCheck::TemporalConsistency => {
                        format!("Temporal inconsistency detected: {reason}")
                    }
                })
            })
            .collect();

        GroundingVerdict {
            is_grounded: checks.iter().all(|c| c.passed),
            checks,
            warnings,
        }
    }

    /// `evaluate`, logging each warning.
    pub fn check(&self, response: &str, context: &str) -> GroundingVerdict {
        let verdict = self.evaluate(response, context);
        for warning in &verdict.warnings {
            warn!(warning = %warning, "response is not grounded in context");
        }
        debug!(is_grounded = verdict.is_grounded, "grounding checks complete");
        verdict
    }

    /// Numbers first, then financial terms; the first failure is reported.
    pub fn check_factual(&self, response: &str, context: &str) -> CheckOutcome {
        let numbers = extract_numbers(response);
        if !numbers.is_subset(&extract_numbers(context)) {
            return failed(GroundingCheck::FactualConsistency, NUMBERS_NOT_IN_CONTEXT.to_string());
        }

        let response = response.to_lowercase();
        let context = context.to_lowercase();
        if let Some(term) = self
            .terms
            .iter()
            .find(|t| response.contains(t.as_str()) && !context.contains(t.as_str()))
        {
            return failed(
                GroundingCheck::FactualConsistency,
                format!("Response introduces financial term '{term}' not in context"),
            );
        }

        passed(GroundingCheck::FactualConsistency)
    }
}

impl Default for GroundingEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn check_temporal(response: &str, context: &str) -> CheckOutcome {
    if extract_dates(response).is_subset(&extract_dates(context)) {
        passed(GroundingCheck::TemporalConsistency)
    } else {
        failed(GroundingCheck::TemporalConsistency, DATES_NOT_IN_CONTEXT.to_string())
    }
}

fn passed(check: GroundingCheck) -> CheckOutcome {
    CheckOutcome { check, passed: true, reason: None }
}

fn failed(check: GroundingCheck, reason: String) -> CheckOutcome {
    CheckOutcome { check, passed: false, reason: Some(reason) }
}
