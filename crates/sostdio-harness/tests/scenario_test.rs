//! Integration test: the conformance suite against the real streams.
//!
//! Runs `default_suite` at several capacities through `ScenarioRunner` and
//! checks the summary, the per-scenario log lines, and the report renderings.
//!
//! Run: cargo test -p sostdio-harness --test scenario_test

use std::path::PathBuf;

use sostdio_core::StdioConfig;
use sostdio_harness::scenarios::{Scenario, payload, sha256_hex};
use sostdio_harness::structured_log::{LogEmitter, validate_log_line};
use sostdio_harness::{ConformanceReport, ScenarioRunner, default_suite};

fn workdir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("sostdio-suite-{tag}-{}-{nanos}", std::process::id()))
}

fn run_suite(capacity: usize) {
    let dir = workdir(&capacity.to_string());
    let runner = ScenarioRunner::new(&dir, StdioConfig::with_capacity(capacity)).unwrap();
    let suite = default_suite(capacity);
    let mut emitter = LogEmitter::to_buffer("suite-test");

    let summary = runner.run_all(&suite, &mut emitter).unwrap();
    let failures: Vec<_> = summary.results.iter().filter(|r| !r.passed).collect();
    assert!(failures.is_empty(), "capacity {capacity}: {failures:#?}");
    assert_eq!(summary.total, suite.len());

    let log = std::str::from_utf8(emitter.buffered().unwrap()).unwrap();
    let entries: Vec<_> = log
        .lines()
        .enumerate()
        .map(|(i, line)| validate_log_line(line, i + 1).unwrap())
        .collect();
    assert_eq!(entries.len(), suite.len() + 2);
    assert_eq!(entries[0].event, "suite_start");
    assert_eq!(entries.last().unwrap().event, "suite_end");
    for (entry, scenario) in entries[1..entries.len() - 1].iter().zip(&suite) {
        assert_eq!(entry.event, "scenario_pass");
        assert_eq!(entry.scenario.as_deref(), Some(scenario.name().as_str()));
        assert_eq!(entry.capacity, Some(capacity as u64));
    }

    // Scratch directories are removed after each scenario.
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    std::fs::remove_dir(&dir).unwrap();
}

#[test]
fn suite_passes_at_default_capacity() {
    run_suite(sostdio_core::BUFF_SIZE);
}

#[test]
fn suite_passes_at_small_capacities() {
    for cap in [1, 3, 16] {
        run_suite(cap);
    }
}

#[test]
fn round_trip_digest_matches_payload() {
    let dir = workdir("digest");
    let runner = ScenarioRunner::new(&dir, StdioConfig::with_capacity(8)).unwrap();
    let (result, _) = runner.run(0, &Scenario::RoundTrip { len: 17 }).unwrap();
    assert!(result.passed, "{}", result.detail);
    assert_eq!(result.digest, Some(sha256_hex(&payload(17))));
    std::fs::remove_dir(&dir).unwrap();
}

#[test]
fn report_renders_suite_results() {
    let dir = workdir("report");
    let runner = ScenarioRunner::new(&dir, StdioConfig::with_capacity(32)).unwrap();
    let suite = [Scenario::EofSticky, Scenario::InvalidMode];
    let summary = runner
        .run_all(&suite, &mut LogEmitter::to_buffer("report-test"))
        .unwrap();
    let report = ConformanceReport {
        title: "suite".into(),
        capacity: 32,
        timestamp: "2026-01-01T00:00:00.000Z".into(),
        summary,
    };

    let md = report.to_markdown();
    assert!(md.contains("| eof_sticky | PASS |"));
    assert!(md.contains("| invalid_mode | PASS |"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["summary"]["passed"], 2);
    assert!(json["summary"]["results"][0]["digest"].is_string());
    std::fs::remove_dir(&dir).unwrap();
}
