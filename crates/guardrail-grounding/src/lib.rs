//! # guardrail-grounding
//!
//! Local contextual grounding checks for assistant responses.
//!
//! The remote guardrail scores grounding with its own models. This crate
//! adds two cheap heuristics the calling application runs on every
//! (response, context) pair before the response is spoken:
//!
//! 1. **Factual consistency**: every number in the response appears in the
//!    context, and the response mentions no financial term the context
//!    does not.
//! 2. **Temporal consistency**: every date in the response appears in the
//!    context.
//!
//! ```rust,ignore
//! let verdict = GroundingEvaluator::new().check(response, context);
//! if !verdict.is_grounded { /* fall back to a safe answer */ }
//! ```

pub mod evaluator;

pub use evaluator::{check_temporal, extract_dates, extract_numbers, GroundingEvaluator};
