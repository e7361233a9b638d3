//! Per-band calibration pipeline.
//!
//! A fixed two-pass refinement per band, not an open-ended convergence loop:
//!
//! 1. init: load runs, select initial anchors, zero shifts (the dependent
//!    band seeds its shifts from the primary band's persisted result);
//! 2. pass 1: build overlaps with current shifts, assemble, solve, add the
//!    corrections to the non-anchor shifts; evaluate for diagnostics;
//! 3. extra-anchor promotion (reference bands only): any non-anchor run
//!    whose solved shift disagrees with a well-matched reference value is
//!    promoted and its shift overwritten with the reference value;
//! 4. pass 2: rebuild overlaps, solve again with the enlarged anchor set;
//! 5. persist the shift and anchor tables.
//!
//! Band-scoped state lives in the `Run` records created at init and is
//! dropped when the band finishes; nothing carries over except through the
//! persisted tables.

use std::collections::HashMap;
use std::fs;

use log::info;

use crate::calib::anchors::select_anchors;
use crate::calib::glazebrook::{solve_corrections, SolveStats};
use crate::calib::graph::build_overlaps;
use crate::data::lists::StaticLists;
use crate::data::registry::Registry;
use crate::domain::{Band, CalibConfig, CalibrationResult, Run, RunId, Thresholds};
use crate::error::CalibError;
use crate::io::export::{shift_table_path, write_calibration};
use crate::io::ingest::load_offset_table;
use crate::math::lsqr::LsqrOptions;
use crate::report;

/// Everything a finished band leaves behind, for summaries and tests.
#[derive(Debug)]
pub struct BandOutcome {
    pub band: Band,
    pub runs: Vec<Run>,
    pub passes: Vec<SolveStats>,
    pub promoted: usize,
}

/// Calibrate every band in dependency order (r, i, then ha seeded from r).
pub fn calibrate_all(config: &CalibConfig) -> Result<(), CalibError> {
    fs::create_dir_all(&config.output_dir)
        .map_err(|e| CalibError::io("failed to create output directory", &config.output_dir, e))?;

    let registry = Registry::load(&config.runs_path)?;
    let lists = StaticLists::load(config)?;

    for band in Band::ALL {
        let outcome = calibrate_band(config, &registry, &lists, band)?;
        info!("{}", report::format_band_summary(band, &outcome.runs));
    }
    Ok(())
}

/// Run the full state machine for one band and persist its tables.
pub fn calibrate_band(
    config: &CalibConfig,
    registry: &Registry,
    lists: &StaticLists,
    band: Band,
) -> Result<BandOutcome, CalibError> {
    info!("starting to calibrate the {band} band");
    let thresholds = &config.thresholds;

    // Init: runs, anchors, seed shifts.
    let mut runs = registry.runs_for_band(band)?;
    let flags = select_anchors(band, &runs, lists, thresholds);
    for (run, anchor) in runs.iter_mut().zip(flags) {
        run.is_anchor = anchor;
    }
    if let Some(seed) = band.seed_band() {
        seed_shifts(config, registry, band, seed, &mut runs)?;
    }

    let offsets = load_offset_table(&config.offsets_dir, band)?;
    let solver_opts = LsqrOptions::default();
    let mut passes = Vec::new();

    // Pass 1.
    let graph = build_overlaps(&runs, &offsets, config.weighted);
    let (corrections, stats) = solve_corrections(&runs, &graph, &solver_opts);
    apply_corrections(&mut runs, &corrections);
    passes.push(stats);
    log_evaluation(band, &runs, config);

    // Extra-anchor promotion between the passes.
    let promoted = if band.has_reference() {
        promote_extra_anchors(band, &mut runs, thresholds)
    } else {
        0
    };

    // Pass 2, with the enlarged anchor set and re-corrected offsets.
    let graph = build_overlaps(&runs, &offsets, config.weighted);
    let (corrections, stats) = solve_corrections(&runs, &graph, &solver_opts);
    apply_corrections(&mut runs, &corrections);
    passes.push(stats);
    log_evaluation(band, &runs, config);

    // Persist: either both tables land or the band fails.
    let result = CalibrationResult {
        band,
        shifts: runs.iter().map(|r| (r.id, r.shift)).collect(),
        anchors: runs.iter().map(|r| (r.id, r.is_anchor)).collect(),
    };
    write_calibration(&config.output_dir, &result)?;

    Ok(BandOutcome {
        band,
        runs,
        passes,
        promoted,
    })
}

/// Add the solve pass corrections to the non-anchor runs.
fn apply_corrections(runs: &mut [Run], corrections: &[f64]) {
    debug_assert_eq!(runs.len(), corrections.len());
    for (run, &correction) in runs.iter_mut().zip(corrections) {
        if !run.is_anchor {
            run.shift += correction;
        }
    }
}

/// Promote non-anchor runs whose solved shift drifts away from a
/// well-matched reference value; the reference wins for those runs.
/// Already-promoted runs are untouched (promotion is monotonic).
fn promote_extra_anchors(band: Band, runs: &mut [Run], thresholds: &Thresholds) -> usize {
    let mut promoted = 0;
    for run in runs.iter_mut() {
        if run.is_anchor {
            continue;
        }
        let Some(ref_shift) = run
            .reference(band)
            .and_then(|c| c.usable(thresholds.min_matches))
        else {
            continue;
        };
        if (ref_shift - run.shift).abs() > thresholds.promotion_tolerance {
            run.is_anchor = true;
            run.shift = ref_shift;
            promoted += 1;
        }
    }
    info!("adding {promoted} extra anchors");
    promoted
}

/// Seed the dependent band's shifts from the primary band's persisted
/// result, matched through each field's primary-band run.
fn seed_shifts(
    config: &CalibConfig,
    registry: &Registry,
    band: Band,
    seed: Band,
    runs: &mut [Run],
) -> Result<(), CalibError> {
    let table = crate::io::export::read_shift_table(&shift_table_path(&config.output_dir, seed))?;

    let seed_run_of_field: HashMap<&str, RunId> = registry
        .fields()
        .iter()
        .filter_map(|f| f.run_in(seed).map(|id| (f.field.as_str(), id)))
        .collect();

    let mut missing = 0usize;
    for run in runs.iter_mut() {
        let seeded = seed_run_of_field
            .get(run.field.as_str())
            .and_then(|id| table.get(id).copied());
        match seeded {
            Some(shift) => run.shift = shift,
            None => {
                missing += 1;
                run.shift = 0.0;
            }
        }
    }
    if missing > 0 {
        log::warn!(
            "{missing} {band}-band runs have no {seed}-band shift to seed from; seeded 0.0"
        );
    }
    info!("seeded {band}-band shifts from the {seed}-band calibration");
    Ok(())
}

fn log_evaluation(band: Band, runs: &[Run], config: &CalibConfig) {
    if let Some(stats) = report::evaluate(band, runs, &config.thresholds) {
        info!("reference comparison: {}", report::format_eval(&stats));
    }
}
