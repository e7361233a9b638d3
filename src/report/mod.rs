//! Diagnostics: evaluation against the reference survey and band summaries.
//!
//! Nothing in here alters calibration state; these functions observe the
//! current shifts so that drifts show up in the log between passes.

use crate::domain::{Band, Run, Thresholds};

/// Discrepancy statistics between the reference survey and the current
/// shifts, over runs with a usable comparison.
#[derive(Debug, Clone, Copy)]
pub struct EvalStats {
    pub n: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

/// Compare current shifts against the reference survey.
///
/// Returns `None` for the band without a reference survey, or when no run
/// has a usable comparison.
pub fn evaluate(band: Band, runs: &[Run], thresholds: &Thresholds) -> Option<EvalStats> {
    let deltas: Vec<f64> = runs
        .iter()
        .filter_map(|run| {
            let reference = run.reference(band)?;
            let ref_shift = reference.usable(thresholds.min_matches)?;
            Some(ref_shift - run.shift)
        })
        .collect();

    if deltas.is_empty() {
        return None;
    }

    let n = deltas.len();
    let mean = deltas.iter().sum::<f64>() / n as f64;
    let variance = deltas.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n as f64;
    let min = deltas.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = deltas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    Some(EvalStats {
        n,
        mean,
        stddev: variance.sqrt(),
        min,
        max,
    })
}

pub fn format_eval(stats: &EvalStats) -> String {
    format!(
        "mean={:.3}+/-{:.3}, min/max={:.3}/{:.3} over {} runs",
        stats.mean, stats.stddev, stats.min, stats.max, stats.n
    )
}

/// One-paragraph band summary for the end of a pipeline.
pub fn format_band_summary(band: Band, runs: &[Run]) -> String {
    let anchors = runs.iter().filter(|r| r.is_anchor).count();
    let mean_shift = if runs.is_empty() {
        0.0
    } else {
        runs.iter().map(|r| r.shift).sum::<f64>() / runs.len() as f64
    };
    format!(
        "band {band}: {} runs, {anchors} anchors, mean shift {mean_shift:.4}",
        runs.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunId, Stability, SurveyComparison};

    fn run(id: u32, shift: f64, ref_shift: Option<f64>, matches: u32) -> Run {
        Run {
            id: RunId(id),
            field: format!("f{id}"),
            l: 0.0,
            b: 0.0,
            night: None,
            ref_r: SurveyComparison {
                shift: ref_shift,
                matches,
            },
            ref_i: SurveyComparison::default(),
            stability: Stability::default(),
            legacy_anchor: false,
            shift,
            is_anchor: false,
        }
    }

    #[test]
    fn evaluates_only_usable_comparisons() {
        let t = Thresholds::default();
        let runs = vec![
            run(1, 0.05, Some(0.10), 100), // delta 0.05
            run(2, 0.00, Some(-0.03), 50), // delta -0.03
            run(3, 0.00, Some(0.50), 5),   // too few matches
            run(4, 0.00, None, 200),       // no shift measured
        ];
        let stats = evaluate(Band::R, &runs, &t).unwrap();
        assert_eq!(stats.n, 2);
        assert!((stats.mean - 0.01).abs() < 1e-12);
        assert!((stats.min + 0.03).abs() < 1e-12);
        assert!((stats.max - 0.05).abs() < 1e-12);
    }

    #[test]
    fn halpha_has_no_reference() {
        let t = Thresholds::default();
        let runs = vec![run(1, 0.05, Some(0.10), 100)];
        assert!(evaluate(Band::Ha, &runs, &t).is_none());
    }
}
