//! Applies a finished calibration to per-field catalogue files.
//!
//! Each field's catalogue is corrected independently using only the
//! persisted shift tables, so the work is embarrassingly parallel: files are
//! fanned out across a rayon pool with no shared mutable state and no
//! ordering requirement. A failure on one file is logged and skipped; it
//! never aborts the batch.
//!
//! Per band, the shift is added to the band's magnitude columns
//! (`r`, `rPeakMag`, `rAperMag1`, `rAperMag3`, and likewise for `i`/`ha`),
//! and the colour columns `rmi` / `rmha` are recomputed from the corrected
//! magnitudes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use crate::data::registry::Registry;
use crate::domain::{Band, RunId};
use crate::error::CalibError;
use crate::io::export::{read_shift_table, shift_table_path};

/// Magnitude column suffixes corrected per band.
const MAG_SUFFIXES: [&str; 4] = ["", "PeakMag", "AperMag1", "AperMag3"];

#[derive(Debug, Clone, Copy, Default)]
struct FieldShifts {
    r: f64,
    i: f64,
    ha: f64,
}

impl FieldShifts {
    fn for_band(&self, band: Band) -> f64 {
        match band {
            Band::R => self.r,
            Band::I => self.i,
            Band::Ha => self.ha,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplySummary {
    pub corrected: usize,
    pub failed: usize,
}

/// Holds the per-band shift tables and the field-to-run mapping.
pub struct Applicator {
    shifts: HashMap<Band, HashMap<RunId, f64>>,
    fields: HashMap<String, [Option<RunId>; 3]>,
}

impl Applicator {
    /// Load the persisted shift tables for all bands.
    pub fn load(registry: &Registry, calib_dir: &Path) -> Result<Applicator, CalibError> {
        let mut shifts = HashMap::new();
        for band in Band::ALL {
            let table = read_shift_table(&shift_table_path(calib_dir, band))?;
            shifts.insert(band, table);
        }

        let fields = registry
            .fields()
            .iter()
            .map(|f| (f.field.clone(), [f.run_r, f.run_i, f.run_ha]))
            .collect();

        Ok(Applicator { shifts, fields })
    }

    /// Correct every `.csv` catalogue in `in_dir`, writing alongside names
    /// into `out_dir`.
    pub fn apply_directory(&self, in_dir: &Path, out_dir: &Path) -> Result<ApplySummary, CalibError> {
        fs::create_dir_all(out_dir)
            .map_err(|e| CalibError::io("failed to create output directory", out_dir, e))?;

        let mut files: Vec<PathBuf> = fs::read_dir(in_dir)
            .map_err(|e| CalibError::io("failed to read catalogue directory", in_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();

        let results: Vec<Result<(), CalibError>> = files
            .par_iter()
            .map(|path| {
                let out_path = out_dir.join(path.file_name().unwrap_or_default());
                self.apply_file(path, &out_path)
            })
            .collect();

        let mut summary = ApplySummary::default();
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok(()) => summary.corrected += 1,
                Err(e) => {
                    warn!("{}: skipped: {e}", path.display());
                    summary.failed += 1;
                }
            }
        }
        info!(
            "application of calibration finished: {} corrected, {} failed",
            summary.corrected, summary.failed
        );
        Ok(summary)
    }

    /// Correct one catalogue file.
    pub fn apply_file(&self, path_in: &Path, path_out: &Path) -> Result<(), CalibError> {
        let field = path_in
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                CalibError::InvalidInput(format!("unusable file name '{}'", path_in.display()))
            })?;
        let shifts = self.shifts_for_field(field);

        let file = File::open(path_in)
            .map_err(|e| CalibError::io("failed to open catalogue", path_in, e))?;
        let mut reader = csv::ReaderBuilder::new().from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| CalibError::csv("failed to read catalogue headers", path_in, e))?
            .clone();

        // Column -> shift to add, resolved once per file.
        let mut column_shifts: Vec<f64> = vec![0.0; headers.len()];
        let mut mag_index: HashMap<Band, Option<usize>> = HashMap::new();
        for band in Band::ALL {
            let mut primary = None;
            for suffix in MAG_SUFFIXES {
                let name = format!("{}{suffix}", band.tag());
                if let Some(pos) = headers.iter().position(|h| h == name) {
                    column_shifts[pos] = shifts.for_band(band);
                    if suffix.is_empty() {
                        primary = Some(pos);
                    }
                }
            }
            mag_index.insert(band, primary);
        }
        let rmi_pos = headers.iter().position(|h| h == "rmi");
        let rmha_pos = headers.iter().position(|h| h == "rmha");

        let out_file = File::create(path_out)
            .map_err(|e| CalibError::io("failed to create corrected catalogue", path_out, e))?;
        let mut writer = csv::Writer::from_writer(out_file);
        writer
            .write_record(&headers)
            .map_err(|e| CalibError::csv("failed to write catalogue headers", path_out, e))?;

        for result in reader.records() {
            let record =
                result.map_err(|e| CalibError::csv("failed to read catalogue row", path_in, e))?;
            let mut values: Vec<String> = record.iter().map(str::to_owned).collect();

            for (pos, value) in values.iter_mut().enumerate() {
                let shift = column_shifts[pos];
                if shift == 0.0 {
                    continue;
                }
                if let Ok(mag) = value.parse::<f64>() {
                    *value = (mag + shift).to_string();
                }
            }

            // Colours are derived from the corrected magnitudes, read out
            // before the colour columns themselves are rewritten.
            let mag = |band: Band| -> Option<f64> {
                mag_index
                    .get(&band)
                    .copied()
                    .flatten()
                    .and_then(|pos| values[pos].parse::<f64>().ok())
            };
            let (r, i, ha) = (mag(Band::R), mag(Band::I), mag(Band::Ha));
            if let (Some(pos), Some(r), Some(i)) = (rmi_pos, r, i) {
                values[pos] = (r - i).to_string();
            }
            if let (Some(pos), Some(r), Some(ha)) = (rmha_pos, r, ha) {
                values[pos] = (r - ha).to_string();
            }

            writer
                .write_record(&values)
                .map_err(|e| CalibError::csv("failed to write catalogue row", path_out, e))?;
        }
        writer
            .flush()
            .map_err(|e| CalibError::io("failed to flush corrected catalogue", path_out, e))?;
        Ok(())
    }

    /// The three shifts applying to one field, zero (with a warning) when a
    /// run has no entry in the persisted table.
    fn shifts_for_field(&self, field: &str) -> FieldShifts {
        let runs = self.fields.get(field);
        let mut shifts = FieldShifts::default();
        for (slot, band) in Band::ALL.iter().enumerate() {
            let value = runs
                .and_then(|r| r[slot])
                .and_then(|id| self.shifts.get(band).and_then(|t| t.get(&id)).copied());
            let value = match value {
                Some(v) => v,
                None => {
                    warn!("no {band} shift for field '{field}'; using 0.0");
                    0.0
                }
            };
            match band {
                Band::R => shifts.r = value,
                Band::I => shifts.i = value,
                Band::Ha => shifts.ha = value,
            }
        }
        shifts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registry::FieldRecord;
    use crate::domain::CalibrationResult;
    use crate::io::export::write_calibration;
    use std::io::Write;

    fn test_registry() -> Registry {
        Registry::from_fields(vec![FieldRecord {
            field: "f001".to_owned(),
            run_r: Some(RunId(101)),
            run_i: Some(RunId(102)),
            run_ha: Some(RunId(103)),
            l: 30.0,
            b: 0.0,
            night: None,
            ref_r: Default::default(),
            ref_i: Default::default(),
            stability: Default::default(),
            legacy_anchor: false,
            release: true,
        }])
        .unwrap()
    }

    fn write_tables(dir: &Path, r: f64, i: f64, ha: f64) {
        for (band, run, shift) in [
            (Band::R, 101, r),
            (Band::I, 102, i),
            (Band::Ha, 103, ha),
        ] {
            write_calibration(
                dir,
                &CalibrationResult {
                    band,
                    shifts: vec![(RunId(run), shift)],
                    anchors: vec![(RunId(run), false)],
                },
            )
            .unwrap();
        }
    }

    fn write_catalogue(dir: &Path) -> PathBuf {
        let path = dir.join("f001.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "id,r,rPeakMag,i,ha,rmi,rmha").unwrap();
        writeln!(file, "s1,14.5,14.4,13.9,14.2,0.6,0.3").unwrap();
        writeln!(file, "s2,15.0,,14.0,15.0,1.0,0.0").unwrap();
        file.flush().unwrap();
        path
    }

    #[test]
    fn corrects_magnitudes_and_recomputes_colours() {
        let calib = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_tables(calib.path(), 0.1, -0.05, 0.0);
        let catalogue = write_catalogue(data.path());

        let applicator = Applicator::load(&test_registry(), calib.path()).unwrap();
        let out_path = out.path().join("f001.csv");
        applicator.apply_file(&catalogue, &out_path).unwrap();

        let corrected = fs::read_to_string(&out_path).unwrap();
        let line = corrected.lines().nth(1).unwrap();
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells[1], "14.6"); // r + 0.1
        assert_eq!(cells[2], "14.5"); // rPeakMag + 0.1
        assert_eq!(cells[3], "13.85"); // i - 0.05
        // rmi recomputed from corrected r and i.
        assert!((cells[5].parse::<f64>().unwrap() - 0.75).abs() < 1e-12);
        // rmha recomputed: 14.6 - 14.2.
        assert!((cells[6].parse::<f64>().unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_shift_application_is_idempotent() {
        let calib = tempfile::tempdir().unwrap();
        let zero_calib = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let out1 = tempfile::tempdir().unwrap();
        let out2 = tempfile::tempdir().unwrap();
        write_tables(calib.path(), 0.1, -0.05, 0.02);
        write_tables(zero_calib.path(), 0.0, 0.0, 0.0);
        write_catalogue(data.path());

        let registry = test_registry();
        let first = Applicator::load(&registry, calib.path()).unwrap();
        let summary = first.apply_directory(data.path(), out1.path()).unwrap();
        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.failed, 0);

        let second = Applicator::load(&registry, zero_calib.path()).unwrap();
        second.apply_directory(out1.path(), out2.path()).unwrap();

        let a = fs::read(out1.path().join("f001.csv")).unwrap();
        let b = fs::read(out2.path().join("f001.csv")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_field_gets_zero_shifts() {
        let calib = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_tables(calib.path(), 0.1, 0.1, 0.1);

        let path = data.path().join("f999.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "id,r\ns1,14.5").unwrap();
        drop(file);

        let applicator = Applicator::load(&test_registry(), calib.path()).unwrap();
        let out_path = out.path().join("f999.csv");
        applicator.apply_file(&path, &out_path).unwrap();
        let corrected = fs::read_to_string(&out_path).unwrap();
        assert!(corrected.contains("s1,14.5"));
    }
}
