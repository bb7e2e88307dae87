#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs the ballistic engine through the simtrace driver.

mod preset;
mod settings;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simtrace_core::StepIndex;
use simtrace_driver::{Driver, RunReport};
use simtrace_engine_ballistic::BallisticEngine;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    preset::Preset,
    settings::{RunArgs, RunFile, RunSettings},
};

#[derive(Debug, Parser)]
#[command(name = "simtrace", version, about = "Run a simulation and persist its telemetry")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Advance the engine and write log, frames, recording and checkpoint.
    Run(RunArgs),
    /// List the available presets.
    Presets,
}

/// Entry point for the simtrace command-line interface.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Run(args) => run(&args),
        Command::Presets => {
            for preset in Preset::ALL {
                println!("{}", preset::describe(preset));
            }
            Ok(ExitCode::SUCCESS)
        }
    };

    match outcome {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &RunArgs) -> Result<ExitCode> {
    let file = match &args.config {
        Some(path) => RunFile::load(path)?,
        None => RunFile::default(),
    };
    let settings = RunSettings::resolve(args, &file);

    let engine = match &settings.restore {
        Some(path) => BallisticEngine::restore(path)
            .with_context(|| format!("failed to restore engine from {}", path.display()))?,
        None => BallisticEngine::new(settings.scene.clone())
            .with_context(|| format!("preset {} has an invalid scene", settings.preset))?,
    };
    let engine = match settings.fail_at_step {
        Some(offset) => {
            let step = StepIndex::new(engine.step().get() + offset);
            engine.with_fault_at(step)
        }
        None => engine,
    };

    info!(preset = %settings.preset, restored = settings.restore.is_some(), "engine ready");
    let mut driver =
        Driver::new(engine, settings.config).context("run configuration rejected")?;

    match driver.run() {
        Ok(report) => {
            print_summary(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("error: {error}");
            if let Some(step) = error.step() {
                eprintln!("failed at step {step}");
            }
            if let Some(checkpoint) = error.checkpoint() {
                eprintln!("partial checkpoint: {}", checkpoint.display());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_summary(report: &RunReport) {
    println!("steps advanced:  {}", report.steps_advanced);
    println!("steps exported:  {}", report.exported_steps);
    println!(
        "rows written:    {} in {} flushes",
        report.rows_written, report.flushes
    );
    println!("frames captured: {}", report.frames_captured);
    println!("log:             {}", report.log_path.display());
    println!("checkpoint:      {}", report.checkpoint.display());
}
