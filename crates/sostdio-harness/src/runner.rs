//! Scenario execution engine.

use std::path::{Path, PathBuf};
use std::time::Instant;

use sostdio_core::StdioConfig;

use crate::error::HarnessResult;
use crate::scenarios::{Scenario, ScenarioOutcome};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::verify::{ScenarioResult, VerificationSummary};

/// Runs scenarios inside a work directory and collects their results.
pub struct ScenarioRunner {
    /// Root under which each scenario gets its own scratch directory.
    pub workdir: PathBuf,
    /// Stream configuration the scenarios run with.
    pub config: StdioConfig,
}

impl ScenarioRunner {
    /// Create a runner, creating `workdir` if needed.
    pub fn new(workdir: impl Into<PathBuf>, config: StdioConfig) -> HarnessResult<Self> {
        let workdir = workdir.into();
        std::fs::create_dir_all(&workdir)?;
        Ok(Self { workdir, config })
    }

    /// Run one scenario in a fresh scratch directory, removed afterwards.
    pub fn run(&self, index: usize, scenario: &Scenario) -> HarnessResult<(ScenarioResult, RunStats)> {
        let scratch = self.scratch_dir(index, scenario);
        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }
        std::fs::create_dir_all(&scratch)?;

        let started = Instant::now();
        let outcome = scenario.run(&scratch, &self.config);
        let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

        std::fs::remove_dir_all(&scratch)?;
        Ok(into_result(scenario, outcome, latency_ns))
    }

    /// Run every scenario in order, logging one entry per scenario plus
    /// suite start and end markers.
    pub fn run_all(
        &self,
        scenarios: &[Scenario],
        emitter: &mut LogEmitter,
    ) -> HarnessResult<VerificationSummary> {
        let capacity = self.config.capacity as u64;
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "suite_start")
                .with_capacity(capacity)
                .with_details(serde_json::json!({
                    "scenarios": scenarios.len(),
                    "workdir": self.workdir.display().to_string(),
                })),
        )?;

        let mut results = Vec::with_capacity(scenarios.len());
        for (index, scenario) in scenarios.iter().enumerate() {
            let (result, stats) = self.run(index, scenario)?;
            emitter.emit_entry(scenario_entry(scenario, &result, &stats, capacity))?;
            results.push(result);
        }

        let summary = VerificationSummary::from_results(results);
        let level = if summary.all_passed() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        emitter.emit_entry(
            LogEntry::new("", level, "suite_end")
                .with_outcome(if summary.all_passed() {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                })
                .with_details(serde_json::json!({
                    "total": summary.total,
                    "passed": summary.passed,
                    "failed": summary.failed,
                })),
        )?;
        emitter.flush()?;
        Ok(summary)
    }

    fn scratch_dir(&self, index: usize, scenario: &Scenario) -> PathBuf {
        scratch_path(&self.workdir, index, scenario)
    }
}

/// Side data from one scenario run that only the log carries.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub latency_ns: u64,
    pub bytes: u64,
    pub errno: Option<i32>,
    pub exit_code: Option<i32>,
}

fn scratch_path(workdir: &Path, index: usize, scenario: &Scenario) -> PathBuf {
    let slug: String = scenario
        .name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    workdir.join(format!("{index:03}-{slug}"))
}

fn into_result(
    scenario: &Scenario,
    outcome: ScenarioOutcome,
    latency_ns: u64,
) -> (ScenarioResult, RunStats) {
    let name = scenario.name();
    match outcome {
        Ok(evidence) => {
            let stats = RunStats {
                latency_ns,
                bytes: evidence.bytes,
                errno: None,
                exit_code: evidence.exit_code,
            };
            let mut result = ScenarioResult::pass(name, evidence.detail);
            if let Some(digest) = evidence.digest {
                result = result.with_digest(digest);
            }
            (result, stats)
        }
        Err(violation) => {
            let stats = RunStats {
                latency_ns,
                errno: violation.errno,
                ..RunStats::default()
            };
            (ScenarioResult::fail(name, violation.message), stats)
        }
    }
}

fn scenario_entry(
    scenario: &Scenario,
    result: &ScenarioResult,
    stats: &RunStats,
    capacity: u64,
) -> LogEntry {
    let (level, event, outcome) = if result.passed {
        (LogLevel::Info, "scenario_pass", Outcome::Pass)
    } else {
        (LogLevel::Error, "scenario_fail", Outcome::Fail)
    };
    let mut entry = LogEntry::new("", level, event)
        .with_scenario(&result.name, scenario.symbol())
        .with_outcome(outcome)
        .with_capacity(capacity)
        .with_latency_ns(stats.latency_ns)
        .with_details(serde_json::json!({
            "detail": result.detail,
            "digest": result.digest,
        }));
    if stats.bytes > 0 {
        entry = entry.with_bytes(stats.bytes);
    }
    if let Some(errno) = stats.errno {
        entry = entry.with_errno(errno);
    }
    if let Some(code) = stats.exit_code {
        entry = entry.with_exit_code(code);
    }
    entry
}
