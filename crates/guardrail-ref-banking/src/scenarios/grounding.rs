//! Scenario 3: Grounding
//!
//! Runs the local grounding checks over assistant replies drawn from a
//! savings-account conversation. Each case pairs a reply with the account
//! context it was generated from.

use guardrail_contracts::{config::GuardrailConfig, error::GuardrailResult, grounding::GroundingVerdict};
use guardrail_grounding::GroundingEvaluator;

/// Account context every fixed case is checked against.
const ACCOUNT_CONTEXT: &str = "Premier Savings pays an interest rate of 4.25% AER. \
     Your balance is 12,500.00 as of 2024-06-30. \
     The next interest payment is on July 1, 2024. \
     Withdrawals are free; there is no penalty for early access.";

struct Case {
    label: &'static str,
    response: &'static str,
    expect_grounded: bool,
}

const CASES: [Case; 5] = [
    Case {
        label: "Restates the rate and date",
        response: "Your interest rate is 4.25% and the next payment is on July 1, 2024.",
        expect_grounded: true,
    },
    Case {
        label: "Invents a rate",
        response: "Your interest rate is 5.1% this month.",
        expect_grounded: false,
    },
    Case {
        label: "Invents a fee",
        response: "Early access is possible, but a fee applies.",
        expect_grounded: false,
    },
    Case {
        label: "Invents a date",
        response: "The next interest payment is on August 1, 2024.",
        expect_grounded: false,
    },
    Case {
        label: "Reformats a date",
        response: "Your balance was last updated Jun 30, 2024.",
        expect_grounded: false,
    },
];

/// Check one reply against its context, logging any warnings.
pub fn evaluate_pair(response: &str, context: &str) -> GroundingVerdict {
    GroundingEvaluator::new().check(response, context)
}

/// Print a verdict the way every case in this scenario does.
pub fn print_verdict(verdict: &GroundingVerdict) {
    for outcome in &verdict.checks {
        println!(
            "    {:<22} {}",
            format!("{:?}", outcome.check),
            if outcome.passed { "PASS" } else { "FAIL" }
        );
    }
    for warning in &verdict.warnings {
        println!("    warning: {}", warning);
    }
    println!(
        "  Grounded:               {}",
        if verdict.is_grounded { "YES" } else { "NO" }
    );
}

// ── Scenario runner ───────────────────────────────────────────────────────────

/// Run Scenario 3: Grounding.
pub fn run_scenario(_config: &GuardrailConfig) -> GuardrailResult<()> {
    println!("=== Scenario 3: Grounding ===");
    println!();
    println!("  Context: {}", ACCOUNT_CONTEXT);
    println!();

    let evaluator = GroundingEvaluator::new();
    for case in &CASES {
        println!("  Case: {}", case.label);
        println!("  Response: {}", case.response);
        let verdict = evaluator.check(case.response, ACCOUNT_CONTEXT);
        print_verdict(&verdict);
        println!(
            "  RESULT: {}",
            if verdict.is_grounded == case.expect_grounded {
                "as expected"
            } else {
                "UNEXPECTED"
            }
        );
        println!();
    }

    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use guardrail_contracts::grounding::GroundingCheck;

    use super::*;

    #[test]
    fn test_every_case_matches_expectation() {
        let evaluator = GroundingEvaluator::new();
        for case in &CASES {
            let verdict = evaluator.evaluate(case.response, ACCOUNT_CONTEXT);
            assert_eq!(verdict.is_grounded, case.expect_grounded, "case: {}", case.label);
        }
    }

    #[test]
    fn test_reformatted_date_fails_temporal_only() {
        let verdict = evaluate_pair(CASES[4].response, ACCOUNT_CONTEXT);
        assert!(verdict.outcome(GroundingCheck::FactualConsistency).unwrap().passed);
        assert!(!verdict.outcome(GroundingCheck::TemporalConsistency).unwrap().passed);
    }

    #[test]
    fn test_invented_fee_names_the_term() {
        let verdict = evaluate_pair(CASES[2].response, ACCOUNT_CONTEXT);
        assert_eq!(
            verdict.warnings,
            vec!["Factual inconsistency detected: Response introduces financial term 'fee' not in context"]
        );
    }

    #[test]
    fn test_run_scenario() {
        run_scenario(&GuardrailConfig::default()).unwrap();
    }
}
