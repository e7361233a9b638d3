//! Numerical kernels: sparse storage and the iterative least-squares solver.

pub mod lsqr;
pub mod sparse;
