//! Persisted calibration outputs.
//!
//! Two CSV tables per band, consumed by the downstream applicator:
//!
//! - `calibration-{band}.csv`: `run,shift`; the shift is *added* to the
//!   run's magnitudes,
//! - `anchors-{band}.csv`: `run,is_anchor`; the anchor flag the shift was
//!   produced under.
//!
//! The shift table is also read back here: the dependent band seeds its
//! initial shifts from the primary band's persisted result.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::domain::{Band, CalibrationResult, RunId};
use crate::error::CalibError;

pub fn shift_table_path(dir: &Path, band: Band) -> PathBuf {
    dir.join(format!("calibration-{band}.csv"))
}

pub fn anchor_table_path(dir: &Path, band: Band) -> PathBuf {
    dir.join(format!("anchors-{band}.csv"))
}

/// Persist one band's shift and anchor tables.
pub fn write_calibration(dir: &Path, result: &CalibrationResult) -> Result<(), CalibError> {
    let shift_path = shift_table_path(dir, result.band);
    info!("writing {}", shift_path.display());
    let mut file = File::create(&shift_path)
        .map_err(|e| CalibError::io("failed to create shift table", &shift_path, e))?;
    writeln!(file, "run,shift")
        .map_err(|e| CalibError::io("failed to write shift table", &shift_path, e))?;
    for &(run, shift) in &result.shifts {
        writeln!(file, "{run},{shift}")
            .map_err(|e| CalibError::io("failed to write shift table", &shift_path, e))?;
    }

    let anchor_path = anchor_table_path(dir, result.band);
    info!("writing {}", anchor_path.display());
    let mut file = File::create(&anchor_path)
        .map_err(|e| CalibError::io("failed to create anchor table", &anchor_path, e))?;
    writeln!(file, "run,is_anchor")
        .map_err(|e| CalibError::io("failed to write anchor table", &anchor_path, e))?;
    for &(run, is_anchor) in &result.anchors {
        writeln!(file, "{run},{}", is_anchor as u8)
            .map_err(|e| CalibError::io("failed to write anchor table", &anchor_path, e))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ShiftRow {
    run: RunId,
    shift: f64,
}

/// Read a persisted shift table into a run -> shift map.
pub fn read_shift_table(path: &Path) -> Result<HashMap<RunId, f64>, CalibError> {
    let file =
        File::open(path).map_err(|e| CalibError::io("failed to open shift table", path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut shifts = HashMap::new();
    for result in reader.deserialize::<ShiftRow>() {
        let row = result.map_err(|e| CalibError::csv("failed to parse shift table", path, e))?;
        shifts.insert(row.run, row.shift);
    }
    Ok(shifts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let result = CalibrationResult {
            band: Band::R,
            shifts: vec![(RunId(101), 0.15), (RunId(201), -0.02), (RunId(301), 0.0)],
            anchors: vec![(RunId(101), false), (RunId(201), false), (RunId(301), true)],
        };
        write_calibration(dir.path(), &result).unwrap();

        let shifts = read_shift_table(&shift_table_path(dir.path(), Band::R)).unwrap();
        assert_eq!(shifts.len(), 3);
        assert_eq!(shifts[&RunId(101)], 0.15);
        assert_eq!(shifts[&RunId(301)], 0.0);
    }
}
