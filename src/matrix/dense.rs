//! Dense‐matrix API on top of Faer.
//!
//! This module provides the `DenseMatrix` trait and its implementation for the `faer::Mat<f64>` type,
//! enabling construction from raw column-major storage, plus the CSR → dense conversion used by the
//! dense reference factorizations.

use crate::matrix::sparse::{CsrMatrix, SparseMatrix};
use faer::Mat;
use faer::linalg::solvers::FullPivLu;

/// Pivots at most this fraction of the largest one are treated as zero.
pub const PIVOT_TOLERANCE: f64 = 1e-10;

/// Magnitudes of the pivots of a full-pivoting LU, in elimination order.
pub fn pivots(lu: &FullPivLu<f64>) -> Vec<f64> {
    let u = lu.U();
    (0..u.nrows().min(u.ncols())).map(|k| u.get(k, k).abs()).collect()
}

/// Number of negligible pivots of `lu`, the dimension of its numerical kernel.
pub fn rank_defect(lu: &FullPivLu<f64>) -> usize {
    let pivots = pivots(lu);
    let largest = pivots.iter().copied().fold(0.0, f64::max);
    pivots.iter().filter(|&&p| !(p > PIVOT_TOLERANCE * largest)).count()
}

/// Column-major construction and extraction.
pub trait DenseMatrix<T>: Sized {
    /// Construct from raw column-major storage.
    fn from_raw(nrows: usize, ncols: usize, data: &[T]) -> Self;
    /// Copy out as column-major storage.
    fn to_column_major(&self) -> Vec<T>;
}

impl DenseMatrix<f64> for Mat<f64> {
    fn from_raw(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i])
    }

    fn to_column_major(&self) -> Vec<f64> {
        let (nrows, ncols) = (self.nrows(), self.ncols());
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(self[(i, j)]);
            }
        }
        data
    }
}

impl CsrMatrix<f64> {
    /// Expand into a dense faer matrix (symmetric storage is mirrored).
    pub fn to_dense(&self) -> Mat<f64> {
        let mut dense = Mat::<f64>::zeros(self.nrows(), self.ncols());
        for i in 0..self.nrows() {
            for (j, v) in self.row(i) {
                dense[(i, j)] += v;
                if self.is_symmetric() && i != j {
                    dense[(j, i)] += v;
                }
            }
        }
        dense
    }
}
