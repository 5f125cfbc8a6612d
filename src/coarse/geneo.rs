//! Adaptive coarse space from local generalized eigenproblems (GenEO).
//!
//! Each subdomain solves the pencil
//!
//! ```text
//!     S v = λ B v,    B = diag(A_bb) / w
//! ```
//!
//! on its interface, where `S` is the local Schur complement, `diag(A_bb)` the
//! diagonal of the interface block and `w` the partition-of-unity weight of each
//! interface DOF. Eigenvectors with `λ` below a threshold capture the low-energy
//! modes the FETI preconditioner cannot see; they become the local columns of the
//! coarse basis.
//!
//! # References
//! - Spillane, Rixen, "Automatic spectral coarse spaces for robust FETI and BDD
//!   algorithms", IJNME 2013.

use crate::core::traits::Scalar;
use crate::error::FetiError;
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::debug;

/// Selected eigenpairs, eigenvalues ascending, vectors column-major.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneoModes<K: Scalar> {
    pub values: Vec<K::Real>,
    pub vectors: Vec<K>,
}

impl<K: Scalar> GeneoModes<K> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Local generalized eigensolver.
pub trait EigenSolver<K: Scalar> {
    /// Solve `S v = λ diag(d / w) v` for an interface of size `dof` and return at most
    /// `nu` eigenpairs with `λ < threshold`.
    ///
    /// `schur` is column-major `dof × dof`, `diagonal` and `weights` have length `dof`.
    fn solve(
        &mut self,
        dof: usize,
        schur: &[K],
        diagonal: &[K],
        weights: &[K::Real],
        nu: usize,
        threshold: K::Real,
    ) -> Result<GeneoModes<K>, FetiError>;
}

/// Dense symmetric eigensolver from nalgebra, for real subdomains.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseGeneo;

impl EigenSolver<f64> for DenseGeneo {
    fn solve(
        &mut self,
        dof: usize,
        schur: &[f64],
        diagonal: &[f64],
        weights: &[f64],
        nu: usize,
        threshold: f64,
    ) -> Result<GeneoModes<f64>, FetiError> {
        FetiError::check_len("Schur complement entries", dof * dof, schur.len())?;
        FetiError::check_len("interface diagonal", dof, diagonal.len())?;
        FetiError::check_len("interface weights", dof, weights.len())?;
        if dof == 0 || nu == 0 {
            return Ok(GeneoModes { values: Vec::new(), vectors: Vec::new() });
        }

        // B^{-1/2} with B = diag(d / w)
        let mut inv_sqrt = Vec::with_capacity(dof);
        for (&d, &w) in diagonal.iter().zip(weights) {
            let b = d / w;
            if !(b > 0.0 && b.is_finite()) {
                return Err(FetiError::Eigen(format!("right-hand side of the pencil is not positive ({b})")));
            }
            inv_sqrt.push(1.0 / b.sqrt());
        }

        // C = B^{-1/2} S B^{-1/2}, symmetrized
        let c = DMatrix::from_fn(dof, dof, |i, j| {
            let sij = 0.5 * (schur[j * dof + i] + schur[i * dof + j]);
            inv_sqrt[i] * sij * inv_sqrt[j]
        });
        let eigen = SymmetricEigen::new(c);

        let mut order: Vec<usize> = (0..dof)
            .filter(|&k| eigen.eigenvalues[k] < threshold)
            .collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        order.truncate(nu);

        let mut values = Vec::with_capacity(order.len());
        let mut vectors = Vec::with_capacity(order.len() * dof);
        for k in order {
            values.push(eigen.eigenvalues[k]);
            let y = eigen.eigenvectors.column(k);
            vectors.extend((0..dof).map(|i| inv_sqrt[i] * y[i]));
        }
        debug!(dof, selected = values.len(), threshold, "GenEO eigenproblem solved");
        Ok(GeneoModes { values, vectors })
    }
}
