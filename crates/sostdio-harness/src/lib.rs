//! Conformance harness for sostdio streams.
//!
//! This crate provides:
//! - Scenarios: one observable stream property each, run in scratch directories
//! - Runner: executes a suite and logs every scenario as structured JSONL
//! - Report generation: human-readable + machine-readable conformance reports

#![forbid(unsafe_code)]

pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod structured_log;
pub mod verify;

pub use error::{HarnessError, HarnessResult};
pub use report::ConformanceReport;
pub use runner::ScenarioRunner;
pub use scenarios::{Scenario, default_suite};
pub use verify::{ScenarioResult, VerificationSummary};
