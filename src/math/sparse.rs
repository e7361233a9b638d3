//! Compressed sparse row storage.
//!
//! The assembled overlap systems are large (one row per non-anchor run,
//! typically tens of thousands) but very sparse: a run overlaps a handful of
//! neighbours. We build from an unordered triplet list, accumulating
//! duplicate `(row, col)` entries, and provide the two products LSQR needs:
//! `A·x` and `Aᵀ·x`.

use nalgebra::DVector;

#[derive(Debug, Clone)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build from `(row, col, value)` triplets; duplicates are summed.
    ///
    /// # Panics
    /// Panics if a triplet index is out of bounds. Indices come from the
    /// assembler's own dense run indexing, so this is a programming error,
    /// not a data error.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        for &(r, c, _) in &sorted {
            assert!(r < nrows && c < ncols, "triplet ({r}, {c}) out of bounds");
        }
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; nrows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values = Vec::with_capacity(sorted.len());

        let mut prev: Option<(usize, usize)> = None;
        for &(r, c, v) in &sorted {
            if prev == Some((r, c)) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                col_idx.push(c);
                values.push(v);
                row_ptr[r + 1] += 1;
                prev = Some((r, c));
            }
        }

        // Prefix-sum row counts into offsets.
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }

        CsrMatrix {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Value at `(row, col)`, zero when not stored. Linear in the row's
    /// entries; intended for tests and diagnostics, not inner loops.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (lo, hi) = (self.row_ptr[row], self.row_ptr[row + 1]);
        self.col_idx[lo..hi]
            .iter()
            .zip(&self.values[lo..hi])
            .filter(|&(&c, _)| c == col)
            .map(|(_, &v)| v)
            .sum()
    }

    /// `A · x`
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.ncols);
        let mut out = DVector::zeros(self.nrows);
        for row in 0..self.nrows {
            let (lo, hi) = (self.row_ptr[row], self.row_ptr[row + 1]);
            let mut acc = 0.0;
            for k in lo..hi {
                acc += self.values[k] * x[self.col_idx[k]];
            }
            out[row] = acc;
        }
        out
    }

    /// `Aᵀ · x`
    pub fn mul_transpose_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.nrows);
        let mut out = DVector::zeros(self.ncols);
        for row in 0..self.nrows {
            let (lo, hi) = (self.row_ptr[row], self.row_ptr[row + 1]);
            for k in lo..hi {
                out[self.col_idx[k]] += self.values[k] * x[row];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplet_duplicates_accumulate() {
        let m = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 0, 2.5), (1, 1, -1.0)]);
        assert_eq!(m.get(0, 0), 3.5);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(1, 1), -1.0);
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn matvec_and_transpose_matvec() {
        // [[1, 2], [0, 3], [4, 0]]
        let m = CsrMatrix::from_triplets(
            3,
            2,
            &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0), (2, 0, 4.0)],
        );
        let x = DVector::from_row_slice(&[1.0, -1.0]);
        let y = m.mul_vec(&x);
        assert_eq!(y.as_slice(), &[-1.0, -3.0, 4.0]);

        let z = DVector::from_row_slice(&[1.0, 1.0, 1.0]);
        let t = m.mul_transpose_vec(&z);
        assert_eq!(t.as_slice(), &[5.0, 5.0]);
    }

    #[test]
    fn empty_rows_are_fine() {
        let m = CsrMatrix::from_triplets(3, 3, &[(2, 0, 1.0)]);
        let x = DVector::from_row_slice(&[2.0, 0.0, 0.0]);
        let y = m.mul_vec(&x);
        assert_eq!(y.as_slice(), &[0.0, 0.0, 2.0]);
    }
}
