//! Core records of the calibration engine.
//!
//! These types are intentionally lightweight and serializable so they can be:
//!
//! - used in-memory while the network adjustment iterates
//! - exported to CSV for downstream consumers
//! - reloaded later (the dependent band seeds from the primary band's output)
//!
//! All dynamic "any column of a table" access happens once at load time in
//! `data::registry`; after that, everything is a named field.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A photometric band of the survey.
///
/// `R` and `I` have an independent, absolutely-calibrated reference survey;
/// `Ha` does not and inherits its scale from the finished `R` calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    R,
    I,
    Ha,
}

impl Band {
    /// Calibration order. `Ha` must come after `R` (hard data dependency).
    pub const ALL: [Band; 3] = [Band::R, Band::I, Band::Ha];

    /// Short tag used in file names and table columns.
    pub fn tag(self) -> &'static str {
        match self {
            Band::R => "r",
            Band::I => "i",
            Band::Ha => "ha",
        }
    }

    /// Whether an external reference survey exists for this band.
    pub fn has_reference(self) -> bool {
        matches!(self, Band::R | Band::I)
    }

    /// The band whose finished calibration seeds this band, if any.
    pub fn seed_band(self) -> Option<Band> {
        match self {
            Band::Ha => Some(Band::R),
            Band::R | Band::I => None,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identifier of a single exposure ("run") in one band.
///
/// Run numbers are numeric in the survey's bookkeeping; parsing happens once
/// at table load and failures are data-integrity errors there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(pub u32);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(RunId)
    }
}

/// Comparison of one run against the external reference survey.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurveyComparison {
    /// Magnitude shift that would bring the run onto the reference scale,
    /// `None` when the crossmatch produced no usable value.
    pub shift: Option<f64>,
    /// Number of stars matched against the reference survey.
    pub matches: u32,
}

impl SurveyComparison {
    /// A defined shift backed by at least `min_matches` stars.
    pub fn usable(&self, min_matches: u32) -> Option<f64> {
        match self.shift {
            Some(s) if s.is_finite() && self.matches >= min_matches => Some(s),
            _ => None,
        }
    }
}

/// Night-to-night repeat-photometry statistics for one field.
///
/// Each entry is the median magnitude difference between repeated
/// observations in one colour index; `None` when no repeats exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stability {
    pub dr: Option<f64>,
    pub di: Option<f64>,
    pub dha: Option<f64>,
}

impl Stability {
    /// All three colour diffs present and within the tolerance band around
    /// their expected systematic medians. Missing data fails the gate.
    pub fn within(&self, thresholds: &Thresholds) -> bool {
        let ok = |value: Option<f64>, expected: f64| match value {
            Some(v) => (v - expected).abs() <= thresholds.stability_tolerance,
            None => false,
        };
        ok(self.dr, thresholds.expected_dr)
            && ok(self.di, thresholds.expected_di)
            && ok(self.dha, thresholds.expected_dha)
    }
}

/// One exposure eligible for the release, as seen by the calibration engine.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    /// Identifier of the survey field this exposure covers.
    pub field: String,
    /// Galactic longitude of the field centre (degrees).
    pub l: f64,
    /// Galactic latitude of the field centre (degrees).
    pub b: f64,
    pub night: Option<NaiveDate>,
    /// Reference-survey comparison in the r band (shared across the field).
    pub ref_r: SurveyComparison,
    /// Reference-survey comparison in the i band (shared across the field).
    pub ref_i: SurveyComparison,
    pub stability: Stability,
    /// Anchor flag inherited from the previous release.
    pub legacy_anchor: bool,

    /// Cumulative correction to *add* to this run's magnitudes.
    /// Mutated additively across pipeline passes.
    pub shift: f64,
    /// Anchors keep their shift fixed during a solve. Promotion is
    /// monotonic: a run never loses anchor status within one pipeline.
    pub is_anchor: bool,
}

impl Run {
    /// The reference comparison for this band, if the band has one.
    pub fn reference(&self, band: Band) -> Option<&SurveyComparison> {
        match band {
            Band::R => Some(&self.ref_r),
            Band::I => Some(&self.ref_i),
            Band::Ha => None,
        }
    }
}

/// Numeric policy knobs. Defaults follow the survey's release values.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Maximum |shift| (mag) for reference-survey agreement checks.
    pub tolerance: f64,
    /// Minimum reference-survey star matches for a run to be trusted.
    pub min_matches: u32,
    /// Minimum |reference shift - solved shift| (mag) that triggers
    /// extra-anchor promotion between the two solve passes.
    pub promotion_tolerance: f64,
    /// Half-width (mag) of the acceptance band around the expected
    /// stability medians.
    pub stability_tolerance: f64,
    /// Expected systematic median of the night-to-night r diff.
    pub expected_dr: f64,
    /// Expected systematic median of the night-to-night i diff.
    pub expected_di: f64,
    /// Expected systematic median of the night-to-night Halpha diff.
    pub expected_dha: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            tolerance: 0.03,
            min_matches: 30,
            promotion_tolerance: 0.05,
            stability_tolerance: 0.03,
            expected_dr: -0.007,
            expected_di: -0.006,
            expected_dha: -0.008,
        }
    }
}

/// A full calibration run's configuration, derived from CLI flags.
#[derive(Debug, Clone)]
pub struct CalibConfig {
    /// Field metadata table (one row per field).
    pub runs_path: PathBuf,
    /// Directory holding `offsets-{band}.csv` tables.
    pub offsets_dir: PathBuf,
    /// Directory receiving `calibration-{band}.csv` / `anchors-{band}.csv`.
    pub output_dir: PathBuf,

    pub extra_anchors_path: Option<PathBuf>,
    pub denylist_path: Option<PathBuf>,
    pub trusted_nights_path: Option<PathBuf>,

    /// Weight overlap edges by `sqrt(matches)`; uniform weights otherwise.
    pub weighted: bool,
    pub thresholds: Thresholds,
}

/// Final outcome of one band's calibration, ready to persist.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub band: Band,
    /// `(run, shift)` in registry order; shift is *added* to magnitudes.
    pub shifts: Vec<(RunId, f64)>,
    /// `(run, is_anchor)` in the same order.
    pub anchors: Vec<(RunId, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_tags_and_ordering() {
        assert_eq!(Band::R.tag(), "r");
        assert_eq!(Band::Ha.tag(), "ha");
        assert_eq!(Band::Ha.seed_band(), Some(Band::R));
        assert!(Band::R.has_reference());
        assert!(!Band::Ha.has_reference());
    }

    #[test]
    fn survey_comparison_usability() {
        let c = SurveyComparison {
            shift: Some(0.02),
            matches: 50,
        };
        assert_eq!(c.usable(30), Some(0.02));
        assert_eq!(c.usable(60), None);

        let nan = SurveyComparison {
            shift: Some(f64::NAN),
            matches: 50,
        };
        assert_eq!(nan.usable(30), None);
    }

    #[test]
    fn stability_gate_requires_all_three_diffs() {
        let thresholds = Thresholds::default();
        let full = Stability {
            dr: Some(-0.01),
            di: Some(0.0),
            dha: Some(-0.02),
        };
        assert!(full.within(&thresholds));

        let missing = Stability {
            dr: Some(-0.01),
            di: None,
            dha: Some(-0.02),
        };
        assert!(!missing.within(&thresholds));

        let drifted = Stability {
            dr: Some(0.05),
            ..full
        };
        assert!(!drifted.within(&thresholds));
    }
}
