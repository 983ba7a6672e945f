//! ThinkFlow command line.
//!
//! `thinkflow run` asks a language model for candidate next steps toward a
//! problem, scores them, and prints the best one as JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use thinkflow::core::types::{AttemptRecord, Decision, RunOutcome};
use thinkflow::exit_codes;
use thinkflow::io::backend::OpenAiBackend;
use thinkflow::io::config::{ThinkConfig, load_config, write_config};
use thinkflow::io::transcript::{TranscriptPaths, write_attempt, write_result};
use thinkflow::logging;
use thinkflow::looping::{LoopConfig, run_thought_loop};
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "thinkflow.toml";

#[derive(Parser)]
#[command(
    name = "thinkflow",
    version,
    about = "Tree-of-thought reasoning loop over a chat-completion backend"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the loop for one problem and print the selected thought.
    Run {
        /// Problem statement to reason about.
        #[arg(long)]
        problem: String,
        /// Thoughts per generation attempt (overrides config).
        #[arg(long)]
        k: Option<usize>,
        /// Write attempt and result transcripts under this directory.
        #[arg(long)]
        record: Option<PathBuf>,
        /// Score the thoughts of a batch concurrently (overrides config).
        #[arg(long)]
        parallel: bool,
    },
}

fn main() {
    logging::init();
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
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            problem,
            k,
            record,
            parallel,
        } => cmd_run(&cli.config, &problem, k, record.as_deref(), parallel),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &ThinkConfig::default())?;
    eprintln!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    config_path: &Path,
    problem: &str,
    k: Option<usize>,
    record: Option<&Path>,
    parallel: bool,
) -> Result<i32> {
    if problem.trim().is_empty() {
        bail!("--problem must be non-empty");
    }
    let mut cfg = load_config(config_path)?;
    if let Some(k) = k {
        cfg.k = k;
    }
    cfg.parallel_evaluations |= parallel;
    cfg.validate()?;

    let backend = OpenAiBackend::from_config(&cfg.backend)?;
    let transcript = record.map(TranscriptPaths::new);
    if let Some(paths) = &transcript {
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create record dir {}", paths.dir.display()))?;
    }

    let loop_config = LoopConfig::from_config(&cfg);
    let outcome = run_thought_loop(&backend, problem, &loop_config, |attempt| {
        report_attempt(attempt);
        if let Some(paths) = &transcript {
            // A transcript write failure does not abort the run.
            if let Err(err) = write_attempt(paths, attempt) {
                warn!("failed to record attempt: {err:#}");
            }
        }
    })?;

    if let Some(paths) = &transcript {
        write_result(paths, &outcome)?;
    }
    print_outcome(&outcome)
}

fn report_attempt(attempt: &AttemptRecord) {
    if let Some(failure) = &attempt.generation_failure {
        eprintln!("attempt {}: {failure}", attempt.attempt);
        return;
    }
    let best = attempt
        .best_score()
        .map_or_else(|| "-".to_string(), |score| score.to_string());
    let decision = match attempt.decision {
        Decision::Retry => "retry".to_string(),
        Decision::Proceed(reason) => format!("proceed ({reason:?})"),
    };
    eprintln!(
        "attempt {}: {} thoughts, best score {best}, {decision}",
        attempt.attempt,
        attempt.thoughts.len()
    );
}

fn print_outcome(outcome: &RunOutcome) -> Result<i32> {
    let Some(best) = &outcome.best else {
        eprintln!(
            "no thought selected after {} attempt(s) ({:?})",
            outcome.attempts, outcome.stop
        );
        return Ok(exit_codes::NO_RESULT);
    };
    println!("{}", to_pretty_json(best)?);
    Ok(exit_codes::OK)
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize json")
}
