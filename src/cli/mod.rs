//! Command-line parsing for the zero-point calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the calibration/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Band, CalibConfig, Thresholds};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "zpcal", version, about = "Global photometric zero-point calibration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Solve the zero-point shifts for every band and write the shift tables.
    Calibrate(CalibrateArgs),
    /// Apply previously computed shift tables to per-field catalogue files.
    Apply(ApplyArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct CalibrateArgs {
    /// Field metadata table (CSV, one row per field).
    #[arg(long)]
    pub runs: PathBuf,

    /// Directory holding the per-band offsets-{band}.csv tables.
    #[arg(long)]
    pub offsets: PathBuf,

    /// Output directory for the shift and anchor tables.
    #[arg(short = 'o', long, default_value = "calibration")]
    pub output: PathBuf,

    /// Calibrate a single band instead of all three.
    ///
    /// Calibrating ha alone requires a calibration-r.csv already present in
    /// the output directory.
    #[arg(short = 'b', long, value_enum)]
    pub band: Option<Band>,

    /// Extra-anchor run list (one run id per line).
    #[arg(long)]
    pub extra_anchors: Option<PathBuf>,

    /// Denylisted run list (one run id per line).
    #[arg(long)]
    pub denylist: Option<PathBuf>,

    /// Trusted-night list (one YYYYMMDD night per line).
    #[arg(long)]
    pub trusted_nights: Option<PathBuf>,

    /// Weight every overlap edge 1.0 instead of sqrt(matches).
    #[arg(long)]
    pub unweighted: bool,

    /// Maximum |shift| (mag) for reference-survey agreement checks.
    #[arg(long, default_value_t = 0.03)]
    pub tolerance: f64,

    /// Minimum reference-survey star matches for a run to be trusted.
    #[arg(long, default_value_t = 30)]
    pub min_matches: u32,

    /// Discrepancy (mag) beyond which a run is promoted to anchor.
    #[arg(long, default_value_t = 0.05)]
    pub promotion_tolerance: f64,

    /// Half-width (mag) of the stability acceptance band.
    #[arg(long, default_value_t = 0.03)]
    pub stability_tolerance: f64,
}

#[derive(Debug, Parser, Clone)]
pub struct ApplyArgs {
    /// Field metadata table (CSV, one row per field).
    #[arg(long)]
    pub runs: PathBuf,

    /// Directory holding the calibration-{band}.csv shift tables.
    #[arg(long, default_value = "calibration")]
    pub calibration: PathBuf,

    /// Directory of per-field catalogue CSV files to correct.
    #[arg(long)]
    pub input: PathBuf,

    /// Directory receiving the corrected catalogues.
    #[arg(short = 'o', long)]
    pub output: PathBuf,
}

impl CalibrateArgs {
    pub fn to_config(&self) -> CalibConfig {
        CalibConfig {
            runs_path: self.runs.clone(),
            offsets_dir: self.offsets.clone(),
            output_dir: self.output.clone(),
            extra_anchors_path: self.extra_anchors.clone(),
            denylist_path: self.denylist.clone(),
            trusted_nights_path: self.trusted_nights.clone(),
            weighted: !self.unweighted,
            thresholds: Thresholds {
                tolerance: self.tolerance,
                min_matches: self.min_matches,
                promotion_tolerance: self.promotion_tolerance,
                stability_tolerance: self.stability_tolerance,
                ..Thresholds::default()
            },
        }
    }
}
