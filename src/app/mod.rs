//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - sets up logging
//! - parses CLI arguments
//! - dispatches to the calibration pipeline or the applicator

use std::fs;

use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::info;

use crate::cli::{ApplyArgs, CalibrateArgs, Command};
use crate::data::lists::StaticLists;
use crate::data::registry::Registry;
use crate::error::CalibError;

pub mod pipeline;

/// Entry point for the `zpcal` binary.
pub fn run() -> Result<(), CalibError> {
    // The handle must stay alive until the process ends, or buffered log
    // output would be lost.
    let _logger = init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Apply(args) => handle_apply(args),
    }
}

/// `RUST_LOG` overrides the default level; logging failures are not fatal.
fn init_logging() -> Option<LoggerHandle> {
    let logger = match Logger::try_with_env_or_str("info") {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("logger initialization failed: {e}");
            return None;
        }
    };
    match logger.start() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("logger initialization failed: {e}");
            None
        }
    }
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), CalibError> {
    let config = args.to_config();
    match args.band {
        None => pipeline::calibrate_all(&config),
        Some(band) => {
            fs::create_dir_all(&config.output_dir).map_err(|e| {
                CalibError::io("failed to create output directory", &config.output_dir, e)
            })?;
            let registry = Registry::load(&config.runs_path)?;
            let lists = StaticLists::load(&config)?;
            let outcome = pipeline::calibrate_band(&config, &registry, &lists, band)?;
            info!(
                "{}",
                crate::report::format_band_summary(band, &outcome.runs)
            );
            Ok(())
        }
    }
}

fn handle_apply(args: ApplyArgs) -> Result<(), CalibError> {
    let registry = Registry::load(&args.runs)?;
    let applicator = crate::apply::Applicator::load(&registry, &args.calibration)?;
    let summary = applicator.apply_directory(&args.input, &args.output)?;
    println!(
        "corrected {} catalogues ({} failed)",
        summary.corrected, summary.failed
    );
    Ok(())
}
