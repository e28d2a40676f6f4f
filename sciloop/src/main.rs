//! Scientific debugging loop CLI.
//!
//! Reads failure signals (`--input`), drives the six-agent loop until no
//! problems remain or the iteration budget is spent, and records the outcome
//! under `.sciloop/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sciloop::agents::SharedRunner;
use sciloop::exit_codes;
use sciloop::io::config::load_config;
use sciloop::io::history::{load_history, save_history};
use sciloop::io::init::{InitOptions, SciloopPaths, init_sciloop};
use sciloop::io::input::load_detection_input;
use sciloop::io::iteration_log::{
    ArtifactPaths, load_loop_result, write_iteration_summary, write_loop_result,
};
use sciloop::io::runner::ShellCommandRunner;
use sciloop::io::storage::MemoryStorage;
use sciloop::orchestrator::ScientificLoopOrchestrator;
use sciloop::tracker::ImprovementTracker;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "sciloop",
    version,
    about = "Scientific debugging loop: detect, hypothesize, test, fix, verify, evolve"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.sciloop/` with a default config, input schema, and empty history.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the loop over a detection input file.
    Run {
        /// Detection input JSON.
        #[arg(short, long)]
        input: PathBuf,
        /// Config file (defaults to `.sciloop/config.toml`).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Artifact directory (defaults to `.sciloop/runs/<timestamp>`).
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Do not execute commands; every command-backed check is skipped.
        #[arg(long)]
        no_exec: bool,
    },
    /// Summarize improvement history and loop results.
    Report {
        /// History file (defaults to `.sciloop/history.json`).
        #[arg(long)]
        history: Option<PathBuf>,
        /// `loop_result.json` files to compute loop health from.
        #[arg(long, num_args = 1..)]
        results: Vec<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    sciloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = SciloopPaths::new(".");
    match cli.command {
        Command::Init { force } => {
            init_sciloop(&paths.root, &InitOptions { force })?;
            Ok(exit_codes::OK)
        }
        Command::Run {
            input,
            config,
            out,
            no_exec,
        } => cmd_run(&paths, &input, config.as_deref(), out, no_exec),
        Command::Report {
            history,
            results,
            json,
        } => cmd_report(&paths, history.as_deref(), &results, json),
    }
}

fn cmd_run(
    paths: &SciloopPaths,
    input: &Path,
    config: Option<&Path>,
    out: Option<PathBuf>,
    no_exec: bool,
) -> Result<i32> {
    let config = load_config(config.unwrap_or(&paths.config_path))?;
    let input = load_detection_input(input)?;
    if input.is_empty() {
        warn!("detection input has no checks; the loop will find nothing to fix");
    }
    let out = out.unwrap_or_else(|| {
        paths
            .runs_dir
            .join(Utc::now().format("%Y%m%d_%H%M%S").to_string())
    });
    let artifacts = ArtifactPaths::new(&out);

    let runner: SharedRunner = if no_exec {
        None
    } else {
        let mut shell = ShellCommandRunner::new(config.process_limits());
        if let Some(workdir) = &config.verification.workdir {
            shell = shell.in_dir(workdir);
        }
        Some(Arc::new(shell))
    };

    let started = Instant::now();
    let mut orchestrator = ScientificLoopOrchestrator::new(config, runner);
    orchestrator.initialize(Arc::new(MemoryStorage::new()));
    let result = orchestrator.run_until_done(&input);
    orchestrator.shutdown();
    let duration_ms = started.elapsed().as_millis() as u64;

    for summary in &result.iterations {
        write_iteration_summary(&artifacts, summary)?;
    }
    let result_path = write_loop_result(&artifacts, &result)?;
    info!(path = %result_path.display(), "loop result written");

    let mut tracker = ImprovementTracker::from_history(load_history(&paths.history_path)?);
    tracker.record_loop(&result, duration_ms);
    save_history(&paths.history_path, tracker.history())?;

    let summary = serde_json::to_string_pretty(&result.summary).context("serialize summary")?;
    println!("{summary}");

    Ok(if result.escalations.is_empty() {
        exit_codes::OK
    } else {
        exit_codes::ESCALATED
    })
}

fn cmd_report(
    paths: &SciloopPaths,
    history: Option<&Path>,
    results: &[PathBuf],
    json: bool,
) -> Result<i32> {
    let tracker =
        ImprovementTracker::from_history(load_history(history.unwrap_or(&paths.history_path))?);
    let results = results
        .iter()
        .map(|path| load_loop_result(path))
        .collect::<Result<Vec<_>>>()?;
    let report = tracker.generate_report(&results);
    if json {
        let raw = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{raw}");
    } else {
        print!("{}", report.render_text());
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["sciloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["sciloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "sciloop",
            "run",
            "--input",
            "signals.json",
            "--out",
            "out",
            "--no-exec",
        ]);
        match cli.command {
            Command::Run {
                input,
                config,
                out,
                no_exec,
            } => {
                assert_eq!(input, PathBuf::from("signals.json"));
                assert!(config.is_none());
                assert_eq!(out, Some(PathBuf::from("out")));
                assert!(no_exec);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_input() {
        assert!(Cli::try_parse_from(["sciloop", "run"]).is_err());
    }

    #[test]
    fn parse_report_with_many_results() {
        let cli = Cli::parse_from(["sciloop", "report", "--results", "a.json", "b.json", "--json"]);
        match cli.command {
            Command::Report {
                history,
                results,
                json,
            } => {
                assert!(history.is_none());
                assert_eq!(results.len(), 2);
                assert!(json);
            }
            _ => panic!("expected report"),
        }
    }
}
