//! LSQR iterative least-squares solver.
//!
//! The assembled overlap system is symmetric by construction but only
//! negative semi-definite in general: when the non-anchor subgraph is
//! disconnected the matrix is rank-deficient. LSQR (Paige & Saunders 1982)
//! handles both cases gracefully:
//!
//! - on a consistent system it converges to the solution,
//! - on a rank-deficient or inconsistent system it converges to the
//!   minimum-norm least-squares solution,
//!
//! which is exactly the "defined fallback, never a crash" behaviour the
//! pipeline wants. Hitting the iteration cap is a silent degrade: the best
//! iterate so far is returned and the caller surfaces it via diagnostics.

use nalgebra::DVector;

use crate::math::sparse::CsrMatrix;

/// Stopping controls. Defaults mirror the survey's production settings.
#[derive(Debug, Clone, Copy)]
pub struct LsqrOptions {
    /// Absolute tolerance on the residual tests.
    pub atol: f64,
    /// Hard iteration cap.
    pub max_iters: usize,
}

impl Default for LsqrOptions {
    fn default() -> Self {
        LsqrOptions {
            atol: 1e-8,
            max_iters: 200_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LsqrSolution {
    pub x: DVector<f64>,
    pub iterations: usize,
    /// False when the iteration cap was reached before the tolerance.
    pub converged: bool,
    /// Final residual norm estimate `||b - A x||`.
    pub residual_norm: f64,
}

/// Solve `min ||A x - b||` with the Golub-Kahan bidiagonalization at the
/// heart of LSQR.
pub fn lsqr(a: &CsrMatrix, b: &DVector<f64>, opts: &LsqrOptions) -> LsqrSolution {
    let n = a.ncols();
    let mut x = DVector::zeros(n);

    let b_norm = b.norm();
    if b_norm == 0.0 {
        return LsqrSolution {
            x,
            iterations: 0,
            converged: true,
            residual_norm: 0.0,
        };
    }

    // Initialize the bidiagonalization.
    let mut beta = b_norm;
    let mut u = b / beta;
    let mut v = a.mul_transpose_vec(&u);
    let mut alpha = v.norm();
    if alpha == 0.0 {
        // b is orthogonal to the range of A: x = 0 is the least-squares
        // answer already.
        return LsqrSolution {
            x,
            iterations: 0,
            converged: true,
            residual_norm: b_norm,
        };
    }
    v /= alpha;

    let mut w = v.clone();
    let mut phibar = beta;
    let mut rhobar = alpha;

    // Frobenius-norm estimate of A, accumulated from the bidiagonal entries.
    let mut anorm_sq = 0.0f64;

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iters {
        iterations += 1;

        // Continue the bidiagonalization.
        u = a.mul_vec(&v) - alpha * &u;
        beta = u.norm();
        if beta > 0.0 {
            u /= beta;
        }
        v = a.mul_transpose_vec(&u) - beta * &v;
        alpha = v.norm();
        if alpha > 0.0 {
            v /= alpha;
        }
        anorm_sq += rhobar * rhobar + beta * beta;

        // Apply the orthogonal transformation of the QR factorization.
        let rho = rhobar.hypot(beta);
        let c = rhobar / rho;
        let s = beta / rho;
        let theta = s * alpha;
        rhobar = -c * alpha;
        let phi = c * phibar;
        phibar *= s;

        // Update the iterate and the search direction.
        x += (phi / rho) * &w;
        w = &v - (theta / rho) * &w;

        // Stopping tests, following Paige & Saunders:
        // 1. residual small relative to the data,
        // 2. normal-equations residual small (rank-deficient/inconsistent
        //    systems stall on test 1 but pass here).
        let arnorm = phibar * alpha * c.abs();
        if phibar <= opts.atol * b_norm {
            converged = true;
            break;
        }
        if arnorm <= opts.atol * anorm_sq.sqrt() * phibar.max(f64::MIN_POSITIVE) {
            converged = true;
            break;
        }
        if alpha == 0.0 {
            converged = true;
            break;
        }
    }

    LsqrSolution {
        x,
        iterations,
        converged,
        residual_norm: phibar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(triplets: &[(usize, usize, f64)], n: usize, b: &[f64]) -> LsqrSolution {
        let a = CsrMatrix::from_triplets(b.len(), n, triplets);
        lsqr(
            &a,
            &DVector::from_row_slice(b),
            &LsqrOptions::default(),
        )
    }

    #[test]
    fn solves_small_symmetric_system() {
        // The two-unknown overlap system from a three-run network with one
        // anchor: [[-2, 1], [1, -1]] x = [-0.17, 0.02].
        let sol = solve(
            &[(0, 0, -2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, -1.0)],
            2,
            &[-0.17, 0.02],
        );
        assert!(sol.converged);
        assert!((sol.x[0] - 0.15).abs() < 1e-8);
        assert!((sol.x[1] - 0.13).abs() < 1e-8);
    }

    #[test]
    fn rank_deficient_returns_least_norm() {
        // Second column never touched: its solution component must be 0.
        let sol = solve(&[(0, 0, 2.0), (1, 0, 0.0)], 2, &[4.0, 0.0]);
        assert!(sol.converged);
        assert!((sol.x[0] - 2.0).abs() < 1e-8);
        assert!(sol.x[1].abs() < 1e-12);
    }

    #[test]
    fn inconsistent_system_minimizes_residual() {
        // Overdetermined single unknown: rows say x=1 and x=3; best is x=2.
        let sol = solve(&[(0, 0, 1.0), (1, 0, 1.0)], 1, &[1.0, 3.0]);
        assert!(sol.converged);
        assert!((sol.x[0] - 2.0).abs() < 1e-8);
        assert!((sol.residual_norm - 2.0f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn zero_rhs_short_circuits() {
        let sol = solve(&[(0, 0, -1.0)], 1, &[0.0]);
        assert!(sol.converged);
        assert_eq!(sol.iterations, 0);
        assert_eq!(sol.x[0], 0.0);
    }

    #[test]
    fn isolated_diagonal_row_yields_zero_correction() {
        // A degenerate run row: diagonal -1, zero rhs entry. The other
        // unknown solves normally.
        let sol = solve(
            &[(0, 0, -1.0), (1, 1, -2.0)],
            2,
            &[0.0, 1.0],
        );
        assert!(sol.converged);
        assert!(sol.x[0].abs() < 1e-12);
        assert!((sol.x[1] + 0.5).abs() < 1e-8);
    }
}
