//! Pairwise offset table ingest.
//!
//! One table per band, `offsets-{band}.csv`, produced upstream by the
//! crossmatching stage: rows of `(run1, run2, offset, matches)`, where
//! `offset` is (run1's magnitude - run2's magnitude) averaged over the stars
//! the two exposures share, and `matches` is how many stars went into it.
//!
//! Rows with a non-finite offset are dropped with a warning; everything else
//! is handed to the graph builder untouched.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::domain::{Band, RunId};
use crate::error::CalibError;

/// One raw overlap measurement between two runs of the same band.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OffsetRow {
    pub run1: RunId,
    pub run2: RunId,
    /// Measured magnitude offset, run1 minus run2.
    pub offset: f64,
    /// Number of shared stars behind the measurement.
    pub matches: u32,
}

pub fn offsets_path(dir: &Path, band: Band) -> PathBuf {
    dir.join(format!("offsets-{band}.csv"))
}

/// Read the full offset table for one band.
pub fn load_offset_table(dir: &Path, band: Band) -> Result<Vec<OffsetRow>, CalibError> {
    let path = offsets_path(dir, band);
    let file =
        File::open(&path).map_err(|e| CalibError::io("failed to open offset table", &path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for result in reader.deserialize::<OffsetRow>() {
        let row = result.map_err(|e| CalibError::csv("failed to parse offset table", &path, e))?;
        if row.offset.is_finite() {
            rows.push(row);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("{}: dropped {dropped} rows with non-finite offsets", path.display());
    }
    Ok(rows)
}
