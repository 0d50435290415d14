//! Ember Compiler
//!
//! Ahead-of-time compiler for the Ember language: parses `.em` files,
//! lowers them to Ember IR, optimizes and writes IR or object files.

mod backend;
mod driver;
mod feedback;
mod frontend;
mod middle;
mod types;
mod utils;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use driver::{CompileOptions, Emit};
use middle::optimize::{OptLevel, SizeLevel};

/// Ember Compiler
#[derive(Parser, Debug)]
#[command(name = "emberc")]
#[command(version = "0.1.0")]
#[command(about = "Ember compiler - semantic analysis and IR lowering for .em files")]
struct Cli {
    /// Input source files (.em)
    #[arg(value_name = "FILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Worker threads; defaults to the number of CPUs
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Artifact to produce
    #[arg(long, value_enum, default_value = "ir")]
    emit: Emit,

    /// Optimization level: 0-3, s or z
    #[arg(long = "opt", short = 'O', default_value = "0", value_parser = parse_opt)]
    opt: (OptLevel, SizeLevel),

    /// Attach source positions to functions
    #[arg(long)]
    debug_info: bool,

    /// Output file (single input only)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log: String,

    /// Write a JSON compile report
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

fn parse_opt(s: &str) -> Result<(OptLevel, SizeLevel), String> {
    OptLevel::parse(s).ok_or_else(|| format!("invalid optimization level `{}` (expected 0-3, s or z)", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let (opt, size) = cli.opt;
    let options = CompileOptions {
        inputs: cli.inputs,
        jobs: cli.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }),
        emit: cli.emit,
        opt,
        size,
        debug_info: cli.debug_info,
        output: cli.output,
        report: cli.report,
    };
    if let Err(message) = options.validate() {
        eprintln!("error: {}", message);
        return ExitCode::from(2);
    }

    match driver::compile(&Arc::new(options)) {
        Ok(report) if report.success => ExitCode::SUCCESS,
        Ok(report) => {
            let failed = report.files.iter().filter(|f| !f.success).count();
            log::warn!("{} of {} files failed", failed, report.files.len());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
