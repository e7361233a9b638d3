//! Sparse linear system assembly.
//!
//! The weighted graph-Laplacian form of "minimize
//! `Σ w·(shift_i - shift_j - correctedOffset_ij)²` over the non-anchor
//! unknowns, anchors acting as fixed boundary values":
//!
//! - diagonal: `A[i,i] = -Σ w` over *all* incident edges of run `i`,
//!   including edges to anchors;
//! - off-diagonal: `A[i,j] += w` for each edge between non-anchors `i` and
//!   `j` (symmetric, because the graph stores both directions);
//! - right-hand side: `b[i] = Σ correctedOffset·w` over all incident edges,
//!   offsets oriented row-run minus neighbour.
//!
//! Edges to anchors thus contribute to the diagonal and to `b`, never to an
//! off-diagonal entry; the anchor's (fixed) shift is already folded into
//! the corrected offset. Do not flip the accumulation: the system would stay
//! solvable and silently produce negated shifts.
//!
//! A non-anchor run with no overlap data is a first-class case, not an
//! exception: its row gets a `-1` diagonal and a zero right-hand side, so
//! the solver returns a zero correction for it, and a warning is logged.

use log::warn;
use nalgebra::DVector;

use crate::calib::graph::OverlapGraph;
use crate::domain::Run;
use crate::math::sparse::CsrMatrix;

#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// Symmetric, one row per non-anchor run.
    pub matrix: CsrMatrix,
    pub rhs: DVector<f64>,
    /// For each system row, the index of its run in the eligible run slice.
    pub rows: Vec<usize>,
}

/// Assemble the overlap system over the non-anchor runs, in run order.
pub fn assemble(runs: &[Run], graph: &OverlapGraph) -> LinearSystem {
    debug_assert_eq!(runs.len(), graph.len());

    // Dense system-row index for every non-anchor run.
    let mut row_of: Vec<Option<usize>> = vec![None; runs.len()];
    let mut rows = Vec::new();
    for (idx, run) in runs.iter().enumerate() {
        if !run.is_anchor {
            row_of[idx] = Some(rows.len());
            rows.push(idx);
        }
    }

    let n = rows.len();
    let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
    let mut rhs = DVector::zeros(n);

    for (row, &idx) in rows.iter().enumerate() {
        let edges = &graph[idx];
        if edges.is_empty() {
            // Disconnected node: defined fallback instead of a crash.
            warn!(
                "run {} has no overlap data; its correction is fixed to zero",
                runs[idx].id
            );
            triplets.push((row, row, -1.0));
            continue;
        }

        let mut diag = 0.0;
        let mut b = 0.0;
        for edge in edges {
            diag -= edge.weight;
            b += edge.offset * edge.weight;
            if let Some(col) = row_of[edge.neighbor] {
                triplets.push((row, col, edge.weight));
            }
        }
        triplets.push((row, row, diag));
        rhs[row] = b;
    }

    LinearSystem {
        matrix: CsrMatrix::from_triplets(n, n, &triplets),
        rhs,
        rows,
    }
}
