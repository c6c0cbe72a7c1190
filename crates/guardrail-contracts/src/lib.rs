//! # guardrail-contracts
//!
//! Shared types, error taxonomy, and configuration for the banking guardrail
//! toolkit.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, the lifecycle transition table, and
//! error types.

pub mod config;
pub mod document;
pub mod envelope;
pub mod error;
pub mod grounding;
pub mod lifecycle;
pub mod remote;
pub mod rule;
pub mod validation;
