//! Overlap graph construction.
//!
//! Turns the raw pairwise offset table into adjacency lists over the
//! eligible runs, expressed relative to the *current* calibration: offsets
//! are corrected by the endpoints' current shifts, so the graph must be
//! rebuilt before every solve pass.
//!
//! Each measurement row `(run1, run2, offset)` is stored once per direction:
//! `run1` sees `(run2, corrected, w)` and `run2` sees `(run1, -corrected, w)`,
//! where `corrected = offset + shift(run1) - shift(run2)`. Every entry is
//! therefore "this run minus the neighbour", which is the orientation the
//! assembler's right-hand side accumulates. The mirroring also guarantees
//! the assembled matrix is symmetric and gives isolated runs an empty list
//! rather than a missing key.

use std::collections::HashMap;

use crate::domain::Run;
use crate::io::ingest::OffsetRow;

#[derive(Debug, Clone, Copy)]
pub struct OverlapEdge {
    /// Index of the neighbouring run in the eligible run slice.
    pub neighbor: usize,
    /// Calibration-corrected offset, this run minus the neighbour.
    pub offset: f64,
    /// Confidence weight: `sqrt(matches)` when weighting is enabled.
    pub weight: f64,
}

/// Adjacency lists parallel to the run slice.
pub type OverlapGraph = Vec<Vec<OverlapEdge>>;

/// Build the calibration-corrected overlap graph.
///
/// Rows referencing runs outside the eligible set, self-overlaps, and rows
/// backed by zero matched stars are ignored. Runs without any surviving row
/// end up with an empty adjacency list (a legal isolated node).
pub fn build_overlaps(runs: &[Run], offsets: &[OffsetRow], weighted: bool) -> OverlapGraph {
    let index: HashMap<_, _> = runs
        .iter()
        .enumerate()
        .map(|(idx, run)| (run.id, idx))
        .collect();

    let mut graph: OverlapGraph = vec![Vec::new(); runs.len()];
    for row in offsets {
        let (Some(&a), Some(&b)) = (index.get(&row.run1), index.get(&row.run2)) else {
            continue;
        };
        if a == b || row.matches == 0 {
            continue;
        }

        // Correcting (run1 - run2) for the current calibration means adding
        // (shift1 - shift2).
        let corrected = row.offset + runs[a].shift - runs[b].shift;
        let weight = if weighted {
            f64::from(row.matches).sqrt()
        } else {
            1.0
        };

        graph[a].push(OverlapEdge {
            neighbor: b,
            offset: corrected,
            weight,
        });
        graph[b].push(OverlapEdge {
            neighbor: a,
            offset: -corrected,
            weight,
        });
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunId, Stability, SurveyComparison};

    fn run(id: u32, shift: f64) -> Run {
        Run {
            id: RunId(id),
            field: format!("f{id}"),
            l: 0.0,
            b: 0.0,
            night: None,
            ref_r: SurveyComparison::default(),
            ref_i: SurveyComparison::default(),
            stability: Stability::default(),
            legacy_anchor: false,
            shift,
            is_anchor: false,
        }
    }

    fn offset(run1: u32, run2: u32, offset: f64, matches: u32) -> OffsetRow {
        OffsetRow {
            run1: RunId(run1),
            run2: RunId(run2),
            offset,
            matches,
        }
    }

    #[test]
    fn corrects_offsets_with_current_shifts_and_mirrors() {
        let runs = vec![run(1, 0.10), run(2, 0.0)];
        let graph = build_overlaps(&runs, &[offset(1, 2, 0.05, 100)], true);

        assert_eq!(graph[0].len(), 1);
        assert_eq!(graph[1].len(), 1);

        let forward = graph[0][0];
        assert_eq!(forward.neighbor, 1);
        assert!((forward.offset - 0.15).abs() < 1e-12);
        assert!((forward.weight - 10.0).abs() < 1e-12);

        let backward = graph[1][0];
        assert_eq!(backward.neighbor, 0);
        assert!((backward.offset + 0.15).abs() < 1e-12);
        assert!((backward.weight - 10.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_weights_when_disabled() {
        let runs = vec![run(1, 0.0), run(2, 0.0)];
        let graph = build_overlaps(&runs, &[offset(1, 2, 0.05, 400)], false);
        assert_eq!(graph[0][0].weight, 1.0);
    }

    #[test]
    fn ignores_unknown_runs_self_pairs_and_empty_matches() {
        let runs = vec![run(1, 0.0), run(2, 0.0)];
        let rows = vec![
            offset(1, 99, 0.05, 10), // unknown endpoint
            offset(1, 1, 0.05, 10),  // self-overlap
            offset(1, 2, 0.05, 0),   // no stars behind it
        ];
        let graph = build_overlaps(&runs, &rows, true);
        assert!(graph[0].is_empty());
        assert!(graph[1].is_empty());
    }

    #[test]
    fn duplicate_pair_rows_become_separate_edges() {
        let runs = vec![run(1, 0.0), run(2, 0.0)];
        let rows = vec![offset(1, 2, 0.04, 25), offset(1, 2, 0.06, 16)];
        let graph = build_overlaps(&runs, &rows, true);
        assert_eq!(graph[0].len(), 2);
        assert_eq!(graph[1].len(), 2);
    }
}
