//! CLI entrypoint for the sostdio conformance harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sostdio_core::StdioConfig;
use sostdio_core::config::parse_capacity;
use sostdio_harness::structured_log::{LogEmitter, now_utc};
use sostdio_harness::{ConformanceReport, HarnessError, ScenarioRunner, default_suite};

/// Conformance tooling for sostdio.
#[derive(Debug, Parser)]
#[command(name = "sostdio-harness")]
#[command(about = "Conformance harness for sostdio buffered streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the conformance suite.
    Run {
        /// Scratch directory for scenario files (default: a fresh one under the temp dir).
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// JSONL log path (default: stderr).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Report path (default: stdout).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Report format.
        #[arg(long, value_enum, default_value = "markdown")]
        format: ReportFormat,
        /// Buffer capacity (decimal or 0x...); defaults to SOSTDIO_BUFSIZ or 4096.
        #[arg(long)]
        capacity: Option<String>,
    },
    /// List the scenarios a run would execute.
    List {
        /// Buffer capacity the suite is expanded for.
        #[arg(long)]
        capacity: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            workdir,
            log,
            report,
            format,
            capacity,
        } => {
            let config = resolve_config(capacity.as_deref())?;
            let run_id = format!("run-{}", std::process::id());
            let workdir = workdir.unwrap_or_else(|| {
                std::env::temp_dir().join(format!("sostdio-harness-{}", std::process::id()))
            });

            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &run_id)?,
                None => LogEmitter::to_stderr(&run_id),
            };
            let suite = default_suite(config.capacity);
            eprintln!(
                "Running {} scenarios at capacity {} in {}",
                suite.len(),
                config.capacity,
                workdir.display()
            );

            let runner = ScenarioRunner::new(&workdir, config)?;
            let summary = runner.run_all(&suite, &mut emitter)?;
            let _ = std::fs::remove_dir(&workdir);

            let report_doc = ConformanceReport {
                title: String::from("sostdio Conformance Report"),
                capacity: config.capacity,
                timestamp: now_utc(),
                summary,
            };
            let body = match format {
                ReportFormat::Markdown => report_doc.to_markdown(),
                ReportFormat::Json => report_doc.to_json(),
            };
            match report {
                Some(path) => {
                    std::fs::write(&path, body)?;
                    eprintln!("Wrote report to {}", path.display());
                }
                None => print!("{body}"),
            }

            eprintln!(
                "Verification complete: total={}, passed={}, failed={}",
                report_doc.summary.total, report_doc.summary.passed, report_doc.summary.failed
            );
            if !report_doc.summary.all_passed() {
                return Err(HarnessError::Failed {
                    failed: report_doc.summary.failed,
                    total: report_doc.summary.total,
                }
                .into());
            }
        }
        Command::List { capacity } => {
            let config = resolve_config(capacity.as_deref())?;
            for scenario in default_suite(config.capacity) {
                println!("{:<28} {}", scenario.name(), scenario.symbol());
            }
        }
    }

    Ok(())
}

fn resolve_config(raw: Option<&str>) -> Result<StdioConfig, HarnessError> {
    match raw {
        Some(raw) => parse_capacity(raw)
            .map(StdioConfig::with_capacity)
            .ok_or_else(|| HarnessError::InvalidCapacity(raw.to_string())),
        None => Ok(*StdioConfig::global()),
    }
}
