//! The Glazebrook network adjustment.
//!
//! Brings a set of exposures with independently derived zero-points onto one
//! global scale by minimising the magnitude offsets where they overlap, in a
//! least-squares sense (Glazebrook et al. 1994, MNRAS 266, 65). Anchors act
//! as boundary conditions: their shifts are never touched, and the solver
//! produces one correction per non-anchor run.

use log::{info, warn};
use nalgebra::DVector;

use crate::calib::graph::OverlapGraph;
use crate::calib::system::assemble;
use crate::domain::Run;
use crate::math::lsqr::{lsqr, LsqrOptions};

/// Diagnostics of one solve pass.
#[derive(Debug, Clone, Copy)]
pub struct SolveStats {
    pub unknowns: usize,
    pub iterations: usize,
    pub converged: bool,
    pub residual_norm: f64,
    pub mean_correction: f64,
    pub stddev_correction: f64,
}

/// Solve the overlap system and scatter the corrections back to run order.
///
/// The returned vector is parallel to `runs`: zero at every anchor, the
/// solved correction elsewhere. Non-convergence is not an error; the best
/// iterate is used and flagged in the stats.
pub fn solve_corrections(
    runs: &[Run],
    graph: &OverlapGraph,
    opts: &LsqrOptions,
) -> (Vec<f64>, SolveStats) {
    let anchors = runs.iter().filter(|r| r.is_anchor).count();
    info!(
        "there are {} runs ({anchors} are anchors)",
        runs.len()
    );

    let system = assemble(runs, graph);
    info!(
        "solving the {0}x{0} overlap system ({1} stored entries)",
        system.matrix.nrows(),
        system.matrix.nnz()
    );

    let solution = lsqr(&system.matrix, &system.rhs, opts);
    if !solution.converged {
        warn!(
            "solver hit the iteration cap ({}) before tolerance; using best iterate \
             (residual {:.3e})",
            solution.iterations, solution.residual_norm
        );
    }

    let mut corrections = vec![0.0; runs.len()];
    for (row, &idx) in system.rows.iter().enumerate() {
        corrections[idx] = solution.x[row];
    }

    let stats = SolveStats {
        unknowns: system.rows.len(),
        iterations: solution.iterations,
        converged: solution.converged,
        residual_norm: solution.residual_norm,
        mean_correction: mean(&solution.x),
        stddev_correction: stddev(&solution.x),
    };
    info!(
        "solution found: mean shift = {:.4} +/- {:.4} ({} iterations)",
        stats.mean_correction, stats.stddev_correction, stats.iterations
    );
    (corrections, stats)
}

fn mean(x: &DVector<f64>) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.sum() / x.len() as f64
}

fn stddev(x: &DVector<f64>) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let m = mean(x);
    (x.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / x.len() as f64).sqrt()
}
