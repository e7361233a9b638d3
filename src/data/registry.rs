//! Run Registry: the survey's field metadata table.
//!
//! One CSV row per survey field, carrying the per-band run numbers, sky
//! position, reference-survey comparison values, night-to-night stability
//! diffs, the legacy anchor flag and the release eligibility flag.
//!
//! Validation happens here, once: row-level parsing with line numbers in the
//! error message, duplicate run detection, and the parallel-array length
//! invariant that every later call site relies on. Downstream code only ever
//! sees typed `Run` records.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{Band, Run, RunId, Stability, SurveyComparison};
use crate::error::CalibError;

/// Raw CSV row. Optional columns deserialize as `None` when empty.
#[derive(Debug, Deserialize)]
struct FieldRow {
    field: String,
    run_r: Option<u32>,
    run_i: Option<u32>,
    run_ha: Option<u32>,
    l: f64,
    b: f64,
    night: Option<String>,
    rshift: Option<f64>,
    rmatch: Option<u32>,
    ishift: Option<f64>,
    imatch: Option<u32>,
    dr: Option<f64>,
    di: Option<f64>,
    dha: Option<f64>,
    anchor: Option<u8>,
    release: Option<u8>,
}

/// One validated field of the survey.
#[derive(Debug, Clone)]
pub struct FieldRecord {
    pub field: String,
    pub run_r: Option<RunId>,
    pub run_i: Option<RunId>,
    pub run_ha: Option<RunId>,
    pub l: f64,
    pub b: f64,
    pub night: Option<NaiveDate>,
    pub ref_r: SurveyComparison,
    pub ref_i: SurveyComparison,
    pub stability: Stability,
    pub legacy_anchor: bool,
    pub release: bool,
}

impl FieldRecord {
    pub fn run_in(&self, band: Band) -> Option<RunId> {
        match band {
            Band::R => self.run_r,
            Band::I => self.run_i,
            Band::Ha => self.run_ha,
        }
    }
}

/// The set of fields eligible for a release, with per-band run extraction.
#[derive(Debug, Clone)]
pub struct Registry {
    fields: Vec<FieldRecord>,
}

impl Registry {
    /// Load and validate the metadata table.
    pub fn load(path: &Path) -> Result<Registry, CalibError> {
        let file = File::open(path).map_err(|e| CalibError::io("failed to open run metadata", path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut fields = Vec::new();
        for (idx, result) in reader.deserialize::<FieldRow>().enumerate() {
            // +2: header line plus 1-based numbering.
            let line = idx + 2;
            let row = result.map_err(|e| {
                CalibError::DataIntegrity(format!(
                    "run metadata '{}' line {line}: {e}",
                    path.display()
                ))
            })?;
            fields.push(validate_row(row, line)?);
        }

        let registry = Registry { fields };
        registry.check_unique_runs()?;
        Ok(registry)
    }

    #[cfg(test)]
    pub fn from_fields(fields: Vec<FieldRecord>) -> Result<Registry, CalibError> {
        let registry = Registry { fields };
        registry.check_unique_runs()?;
        Ok(registry)
    }

    pub fn fields(&self) -> &[FieldRecord] {
        &self.fields
    }

    /// The ordered set of release-eligible runs for one band.
    ///
    /// Fails with a `DataIntegrityError` when the parallel metadata arrays
    /// disagree in length; this invariant must hold at every call site.
    pub fn runs_for_band(&self, band: Band) -> Result<Vec<Run>, CalibError> {
        let eligible: Vec<&FieldRecord> = self
            .fields
            .iter()
            .filter(|f| f.release && f.run_in(band).is_some())
            .collect();

        // Parallel metadata arrays, in registry order.
        let ids: Vec<RunId> = eligible.iter().filter_map(|f| f.run_in(band)).collect();
        let comparisons_r: Vec<SurveyComparison> = eligible.iter().map(|f| f.ref_r).collect();
        let comparisons_i: Vec<SurveyComparison> = eligible.iter().map(|f| f.ref_i).collect();
        let stabilities: Vec<Stability> = eligible.iter().map(|f| f.stability).collect();

        check_parallel_lengths(&[
            ("runs", ids.len()),
            ("reference shifts (r)", comparisons_r.len()),
            ("reference shifts (i)", comparisons_i.len()),
            ("stability", stabilities.len()),
        ])?;

        Ok(eligible
            .iter()
            .zip(ids)
            .map(|(f, id)| Run {
                id,
                field: f.field.clone(),
                l: f.l,
                b: f.b,
                night: f.night,
                ref_r: f.ref_r,
                ref_i: f.ref_i,
                stability: f.stability,
                legacy_anchor: f.legacy_anchor,
                shift: 0.0,
                is_anchor: false,
            })
            .collect())
    }

    /// A run number may appear once per band, never twice.
    fn check_unique_runs(&self) -> Result<(), CalibError> {
        for band in Band::ALL {
            let mut seen = HashSet::new();
            for field in &self.fields {
                if let Some(id) = field.run_in(band) {
                    if !seen.insert(id) {
                        return Err(CalibError::DataIntegrity(format!(
                            "run {id} appears twice in the {band} band metadata"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_row(row: FieldRow, line: usize) -> Result<FieldRecord, CalibError> {
    let night = match row.night.as_deref() {
        None | Some("") => None,
        Some(s) => Some(NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| {
            CalibError::DataIntegrity(format!("line {line}: bad night '{s}': {e}"))
        })?),
    };

    Ok(FieldRecord {
        field: row.field,
        run_r: row.run_r.map(RunId),
        run_i: row.run_i.map(RunId),
        run_ha: row.run_ha.map(RunId),
        l: row.l,
        b: row.b,
        night,
        ref_r: comparison(row.rshift, row.rmatch),
        ref_i: comparison(row.ishift, row.imatch),
        stability: Stability {
            dr: finite(row.dr),
            di: finite(row.di),
            dha: finite(row.dha),
        },
        legacy_anchor: row.anchor == Some(1),
        release: row.release != Some(0),
    })
}

/// Non-finite shifts (failed crossmatches are often written as NaN) are
/// treated as absent.
fn comparison(shift: Option<f64>, matches: Option<u32>) -> SurveyComparison {
    SurveyComparison {
        shift: finite(shift),
        matches: matches.unwrap_or(0),
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn check_parallel_lengths(arrays: &[(&str, usize)]) -> Result<(), CalibError> {
    if let Some(&(_, expected)) = arrays.first() {
        for &(name, len) in &arrays[1..] {
            if len != expected {
                return Err(CalibError::DataIntegrity(format!(
                    "metadata array '{name}' has {len} entries, expected {expected}"
                )));
            }
        }
    }
    Ok(())
}
