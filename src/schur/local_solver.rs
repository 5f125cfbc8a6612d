//! Local direct solvers.
//!
//! Each subdomain factorizes its full local matrix `K` (for the FETI operator and
//! the particular solution) and, when it has interior unknowns, its interior block
//! `A_ii` (for Dirichlet preconditioning and condensation). Sparse factorization is
//! delegated; [`DenseLu`] is a faer-backed reference for small subdomains.
//!
//! Floating subdomains have a singular `K`. [`DenseLu`] detects the rank defect from
//! its pivots and, for symmetric matrices, factorizes `K + s N Nᵀ` instead, where the
//! columns of `N` span the numerical kernel. The inverse of that matrix is a
//! generalized inverse of `K`, and `N` is returned by [`LocalSolver::kernel`] for use
//! as a deficiency basis.
//!
//! # References
//! - Faer documentation: https://github.com/sarah-ek/faer-rs
//! - Golub & Van Loan, Matrix Computations

use crate::core::traits::Scalar;
use crate::error::FetiError;
use crate::matrix::dense::{pivots, rank_defect};
use crate::matrix::sparse::{CsrMatrix, SparseMatrix};
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, Mat, MatMut};
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::debug;

/// A factorized local matrix.
pub trait LocalSolver<K: Scalar>: Sized {
    /// Factorize `a`. Numerical breakdown is reported by the implementation if it can
    /// detect it; otherwise later solves return non-finite values.
    fn factorize(a: &CsrMatrix<K>) -> Result<Self, FetiError>;

    /// Order of the factorized matrix.
    fn size(&self) -> usize;

    /// Orthonormal basis of the kernel found while factorizing, column-major with
    /// one column of length [`LocalSolver::size`] per vector. Empty when the matrix
    /// is regular or the solver does not look for one.
    fn kernel(&self) -> &[K] {
        &[]
    }

    /// x ← A⁻¹ x
    fn solve_in_place(&self, x: &mut [K]);

    /// x ← A⁻¹ b
    fn solve(&self, b: &[K], x: &mut [K]) {
        x.copy_from_slice(b);
        self.solve_in_place(x);
    }

    /// Solve for `n` right-hand sides stored one after the other in `x`.
    fn solve_many(&self, x: &mut [K], n: usize) {
        let size = self.size();
        debug_assert_eq!(x.len(), size * n);
        if size == 0 {
            return;
        }
        for rhs in x.chunks_mut(size) {
            self.solve_in_place(rhs);
        }
    }
}

/// LU solver using full pivoting from Faer.
///
/// Stores the LU factorization for reuse. A singular symmetric matrix is
/// factorized with its kernel shifted out, see the module documentation.
pub struct DenseLu {
    n: usize,
    factor: Option<FullPivLu<f64>>,
    kernel: Vec<f64>,
}

/// Eigenvectors of the `count` eigenvalues of smallest magnitude, column-major.
fn symmetric_kernel(a: &Mat<f64>, count: usize) -> Vec<f64> {
    let n = a.nrows();
    let sym = DMatrix::from_fn(n, n, |i, j| 0.5 * (a[(i, j)] + a[(j, i)]));
    let eigen = SymmetricEigen::new(sym);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| eigen.eigenvalues[x].abs().total_cmp(&eigen.eigenvalues[y].abs()));
    let mut kernel = Vec::with_capacity(count * n);
    for &k in order.iter().take(count) {
        kernel.extend(eigen.eigenvectors.column(k).iter().copied());
    }
    kernel
}

fn is_symmetric(a: &Mat<f64>) -> bool {
    let n = a.nrows();
    let scale = (0..n)
        .flat_map(|j| (0..n).map(move |i| (i, j)))
        .fold(0.0_f64, |m, (i, j)| m.max(a[(i, j)].abs()));
    (0..n).all(|j| (j + 1..n).all(|i| (a[(i, j)] - a[(j, i)]).abs() <= 1e-12 * scale))
}

impl LocalSolver<f64> for DenseLu {
    fn factorize(a: &CsrMatrix<f64>) -> Result<Self, FetiError> {
        if a.nrows() != a.ncols() {
            return Err(FetiError::Factorization(format!(
                "matrix is {}x{}, expected square",
                a.nrows(),
                a.ncols()
            )));
        }
        let n = a.nrows();
        if n == 0 {
            return Ok(DenseLu { n, factor: None, kernel: Vec::new() });
        }
        let dense = a.to_dense();
        let factor = FullPivLu::new(dense.as_ref());
        let defect = rank_defect(&factor);
        if defect == 0 {
            return Ok(DenseLu { n, factor: Some(factor), kernel: Vec::new() });
        }
        if !is_symmetric(&dense) {
            return Err(FetiError::Factorization(format!(
                "singular unsymmetric matrix of order {n} (rank defect {defect})"
            )));
        }

        let kernel = symmetric_kernel(&dense, defect);
        let largest = pivots(&factor).into_iter().fold(0.0, f64::max);
        let shift = if largest > 0.0 { largest } else { 1.0 };
        let shifted = Mat::<f64>::from_fn(n, n, |i, j| {
            let nn: f64 = kernel.chunks(n).map(|v| v[i] * v[j]).sum();
            dense[(i, j)] + shift * nn
        });
        let factor = FullPivLu::new(shifted.as_ref());
        if rank_defect(&factor) > 0 {
            return Err(FetiError::Factorization(format!(
                "matrix of order {n} stays singular after removing a kernel of dimension {defect}"
            )));
        }
        debug!(n, defect, shift, "singular local matrix, factorized with its kernel shifted out");
        Ok(DenseLu { n, factor: Some(factor), kernel })
    }

    fn size(&self) -> usize {
        self.n
    }

    fn kernel(&self) -> &[f64] {
        &self.kernel
    }

    /// Solve in place using the cached LU factorization.
    fn solve_in_place(&self, x: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n);
        if let Some(factor) = &self.factor {
            let n = x.len();
            let x_mat = MatMut::from_column_major_slice_mut(x, n, 1);
            factor.solve_in_place_with_conj(Conj::No, x_mat);
        }
    }
}
