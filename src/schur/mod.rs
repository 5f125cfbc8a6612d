//! Interior/interface split of a subdomain matrix and the local preconditioner kernels.
//!
//! Local unknowns are ordered interior first, interface last:
//!
//! ```text
//!     K = | A_ii  A_ib |     n = m + dof
//!         | A_bi  A_bb |
//! ```
//!
//! The interface block is what the FETI operators see. The kernels here are the
//! local actions of the FETI preconditioners:
//! - Dirichlet: `S = A_bb − A_bi A_ii⁻¹ A_ib` (the Schur complement),
//! - Lumped: `A_bb`,
//! - Superlumped: `diag(A_bb)`,
//! - None: identity.

pub mod local_solver;
pub use local_solver::{DenseLu, LocalSolver};

use crate::config::options::FetiPreconditioner;
use crate::core::traits::Scalar;
use crate::core::wrappers::axpy;
use crate::error::FetiError;
use crate::matrix::sparse::{CsrMatrix, SparseMatrix};

#[cfg(feature = "rayon")]
const PAR_ROWS: usize = 4096;

/// y ← A x on the interface block, row-parallel for large interfaces.
fn interface_spmv<K: Scalar>(a: &CsrMatrix<K>, x: &[K], y: &mut [K]) {
    #[cfg(feature = "rayon")]
    {
        if a.nrows() >= PAR_ROWS {
            a.spmv_parallel(x, y);
            return;
        }
    }
    a.spmv(x, y);
}

/// Local matrix split into interior and interface blocks, with its factorizations.
pub struct Schur<K: Scalar, L> {
    interior: usize,
    dof: usize,
    a: CsrMatrix<K>,
    a_ib: CsrMatrix<K>,
    a_bi: CsrMatrix<K>,
    a_bb: CsrMatrix<K>,
    diag_bb: Vec<K>,
    full: L,
    dirichlet: Option<L>,
    structure: Vec<K>,
    work: Vec<K>,
    work_b: Vec<K>,
}

impl<K: Scalar, L: LocalSolver<K>> Schur<K, L> {
    /// Split `a` after its first `interior` unknowns and factorize `K` and `A_ii`.
    pub fn new(a: CsrMatrix<K>, interior: usize) -> Result<Self, FetiError> {
        FetiError::check_len("local matrix columns", a.nrows(), a.ncols())?;
        let n = a.nrows();
        if interior > n {
            return Err(FetiError::DimensionMismatch { what: "interior unknowns", expected: n, found: interior });
        }
        let dof = n - interior;
        let a_ii = a.block(0..interior, 0..interior);
        let a_ib = a.block(0..interior, interior..n);
        let a_bi = a.block(interior..n, 0..interior);
        let a_bb = a.block(interior..n, interior..n);
        let diag_bb = a_bb.diagonal();
        let full = L::factorize(&a)?;
        let dirichlet = if interior > 0 { Some(L::factorize(&a_ii)?) } else { None };
        Ok(Self {
            interior,
            dof,
            a,
            a_ib,
            a_bi,
            a_bb,
            diag_bb,
            full,
            dirichlet,
            structure: vec![K::zero(); n],
            work: vec![K::zero(); interior],
            work_b: vec![K::zero(); dof],
        })
    }

    /// Number of interior unknowns `m`.
    pub fn interior(&self) -> usize {
        self.interior
    }

    /// Number of interface unknowns.
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Total number of local unknowns `n`.
    pub fn size(&self) -> usize {
        self.interior + self.dof
    }

    pub fn matrix(&self) -> &CsrMatrix<K> {
        &self.a
    }

    /// Kernel of `K` detected by the local factorization, column-major with one
    /// column of length [`Schur::size`] per vector. Empty for a regular `K`.
    pub fn kernel(&self) -> &[K] {
        self.full.kernel()
    }

    /// x ← K⁻¹ b on the full local system.
    pub fn solve(&self, b: &[K], x: &mut [K]) {
        self.full.solve(b, x);
    }

    /// x ← K⁻¹ x on the full local system.
    pub fn solve_in_place(&self, x: &mut [K]) {
        self.full.solve_in_place(x);
    }

    /// u ← (K⁻¹ [0; u])_b, i.e. `S⁻¹ u`, the interface part of a full solve with zero
    /// interior right-hand side.
    pub fn solve_interface(&mut self, u: &mut [K]) {
        debug_assert_eq!(u.len(), self.dof);
        let m = self.interior;
        self.structure[..m].iter_mut().for_each(|v| *v = K::zero());
        self.structure[m..].copy_from_slice(u);
        self.full.solve_in_place(&mut self.structure);
        u.copy_from_slice(&self.structure[m..]);
    }

    /// Same as [`Schur::solve_interface`] but keeps the whole local vector in `x`.
    pub fn solve_from_interface(&mut self, u: &[K], x: &mut [K]) {
        let m = self.interior;
        x[..m].iter_mut().for_each(|v| *v = K::zero());
        x[m..].copy_from_slice(u);
        self.full.solve_in_place(x);
    }

    /// g ← f_b − A_bi A_ii⁻¹ f_i, the right-hand side condensed on the interface.
    pub fn condense(&mut self, f: &[K], g: &mut [K]) {
        let m = self.interior;
        g.copy_from_slice(&f[m..]);
        if let Some(dirichlet) = &self.dirichlet {
            dirichlet.solve(&f[..m], &mut self.work);
            self.a_bi.spmv(&self.work, &mut self.work_b);
            axpy(-K::one(), &self.work_b, g);
        }
    }

    /// u ← S u with `S = A_bb − A_bi A_ii⁻¹ A_ib`.
    pub fn apply_schur_complement(&mut self, u: &mut [K]) {
        debug_assert_eq!(u.len(), self.dof);
        interface_spmv(&self.a_bb, u, &mut self.work_b);
        if let Some(dirichlet) = &self.dirichlet {
            self.a_ib.spmv(u, &mut self.work);
            dirichlet.solve_in_place(&mut self.work);
            // u is free once A_bb u has been stored
            self.a_bi.spmv(&self.work, u);
            for (ui, &bi) in u.iter_mut().zip(&self.work_b) {
                *ui = bi - *ui;
            }
        } else {
            u.copy_from_slice(&self.work_b);
        }
    }

    /// u ← A_bb u
    pub fn apply_lumped(&mut self, u: &mut [K]) {
        interface_spmv(&self.a_bb, u, &mut self.work_b);
        u.copy_from_slice(&self.work_b);
    }

    /// u ← diag(A_bb) u
    pub fn apply_superlumped(&self, u: &mut [K]) {
        for (ui, &d) in u.iter_mut().zip(&self.diag_bb) {
            *ui *= d;
        }
    }

    /// Apply the local action of `variant` to one interface vector.
    pub fn apply_local(&mut self, variant: FetiPreconditioner, u: &mut [K]) {
        match variant {
            FetiPreconditioner::Dirichlet => self.apply_schur_complement(u),
            FetiPreconditioner::Lumped => self.apply_lumped(u),
            FetiPreconditioner::Superlumped => self.apply_superlumped(u),
            FetiPreconditioner::None => {}
        }
    }

    /// Apply the local action of `variant` to `n` interface vectors stored back to back.
    pub fn apply_local_many(&mut self, variant: FetiPreconditioner, u: &mut [K], n: usize) {
        debug_assert_eq!(u.len(), n * self.dof);
        if self.dof == 0 {
            return;
        }
        for column in u.chunks_mut(self.dof) {
            self.apply_local(variant, column);
        }
    }

    /// Diagonal of the interface block, the coefficient used by stiffness scaling.
    pub fn stiffness_scaling(&self, out: &mut [K]) {
        out.copy_from_slice(&self.diag_bb);
    }

    /// x ← x − [−A_ii⁻¹ A_ib u; u], removing the harmonic extension of the interface
    /// correction `u` from the local vector.
    pub fn subtract_harmonic_extension(&mut self, u: &[K], x: &mut [K]) {
        let m = self.interior;
        if let Some(dirichlet) = &self.dirichlet {
            self.a_ib.spmv(u, &mut self.work);
            dirichlet.solve_in_place(&mut self.work);
            axpy(K::one(), &self.work, &mut x[..m]);
        }
        axpy(-K::one(), u, &mut x[m..]);
    }

    /// Dense Schur complement, column-major `dof × dof`.
    pub fn dense_schur_complement(&mut self) -> Vec<K> {
        let dof = self.dof;
        let mut s = vec![K::zero(); dof * dof];
        for (k, column) in s.chunks_mut(dof.max(1)).enumerate().take(dof) {
            column[k] = K::one();
            self.apply_schur_complement(column);
        }
        s
    }
}
