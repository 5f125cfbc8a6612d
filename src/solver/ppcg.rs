//! Projected Conjugate Gradient on the FETI dual problem (Farhat & Roux, 1991).
//!
//! Solves `F λ = d` on the admissible space `Gᵀ λ = e` using the primitives of
//! [`Feti`]: the residual is kept in the range of `Pᵀ` and search directions in the
//! range of `P`. Every rank of the communicator runs [`ProjectedCg::solve`]; ranks
//! without a subdomain follow the same sequence of collectives through
//! [`CoarseOnlyRank`] and see the same global scalars, so they stop at the same
//! iteration.
//!
//! Breakdown checks are relative to the initial `rᵀz`: once the preconditioned
//! residual is at rounding level the iteration stops without an error, while a
//! clearly negative `rᵀz` or a non-positive curvature is reported. Non-finite
//! residuals, typically from a singular local or coarse factorization, are errors.

use crate::coarse::CoarseOperator;
use crate::core::traits::Scalar;
use crate::core::wrappers::{axpby, axpy};
use crate::error::FetiError;
use crate::feti::{CoarseOnlyRank, Feti, FetiRank, ProjectionDirection};
use crate::parallel::{Comm, NeighborExchange};
use crate::schur::LocalSolver;
use crate::utils::convergence::{Convergence, SolveStats};
use num_traits::Float;
use std::fmt::Debug;
use tracing::{debug, trace, warn};

/// Outcome of the checks on `rᵀz` after a residual update.
enum Step {
    Continue,
    Stagnated,
}

/// `rz0` is the initial `rᵀz`; values within rounding of it are negligible.
fn check_rz<T: Float>(rz_new: T, rz0: T, iteration: usize) -> Result<Step, FetiError> {
    if !rz_new.is_finite() {
        return Err(FetiError::NonFinite("preconditioned residual"));
    }
    let negligible = T::epsilon() * rz0.abs();
    if rz_new < -negligible {
        warn!(iteration, "indefinite FETI preconditioner");
        return Err(FetiError::IndefinitePreconditioner);
    }
    if rz_new <= negligible {
        debug!(iteration, "preconditioned residual at rounding level, stopping");
        return Ok(Step::Stagnated);
    }
    Ok(Step::Continue)
}

fn check_curvature<T: Float>(pq: T, iteration: usize) -> Result<(), FetiError> {
    if !pq.is_finite() {
        return Err(FetiError::NonFinite("curvature"));
    }
    if pq <= T::zero() {
        warn!(iteration, "non-positive curvature in projected CG");
        return Err(FetiError::IndefiniteOperator);
    }
    Ok(())
}

pub struct ProjectedCg<T> {
    pub conv: Convergence<T>,
    pub monitor: Option<Box<dyn FnMut(usize, T)>>,
    pub residual_history: Vec<T>,
}

impl<T: Copy + Float + Debug> ProjectedCg<T> {
    pub fn new(tol: T, max_iters: usize) -> Self {
        Self {
            conv: Convergence { tol, max_iters },
            monitor: None,
            residual_history: Vec::new(),
        }
    }

    pub fn with_monitor<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize, T) + 'static,
    {
        self.monitor = Some(Box::new(f));
        self
    }

    pub fn clear_history(&mut self) {
        self.residual_history.clear();
    }

    fn record(&mut self, i: usize, res: T) {
        if let Some(ref mut monitor) = self.monitor {
            monitor(i, res);
        }
        self.residual_history.push(res);
    }

    /// Solve with right-hand side `f`, writing the local primal solution into `x`.
    ///
    /// On a coarse-only rank `f` and `x` are ignored and may be empty.
    pub fn solve<K, C, L, O>(
        &mut self,
        rank: &mut FetiRank<K, C, L, O>,
        f: &[K],
        x: &mut [K],
    ) -> Result<SolveStats<T>, FetiError>
    where
        K: Scalar<Real = T>,
        C: Comm + NeighborExchange<K>,
        L: LocalSolver<K>,
        O: CoarseOperator<K>,
    {
        match rank {
            FetiRank::Subdomain(feti) => self.solve_subdomain(feti, f, x),
            FetiRank::CoarseOnly(coarse) => self.solve_coarse_only(coarse),
        }
    }

    fn solve_subdomain<K, C, L, O>(
        &mut self,
        feti: &mut Feti<K, C, L, O>,
        f: &[K],
        x: &mut [K],
    ) -> Result<SolveStats<T>, FetiError>
    where
        K: Scalar<Real = T>,
        C: Comm + NeighborExchange<K>,
        L: LocalSolver<K>,
        O: CoarseOperator<K>,
    {
        let mut l = feti.allocate_dual();
        let mut r = feti.allocate_dual();
        let mut z = feti.allocate_dual();
        let mut q = feti.allocate_dual();
        let mut tmp = feti.allocate_dual();

        feti.initialize_pcg(f, x, &mut l, &mut r);
        feti.precond(&r, &mut tmp);
        feti.project(ProjectionDirection::Forward, &tmp, &mut z);
        let mut p = z.clone();
        let mut rz = feti.dot(&r, &z);
        let res0 = feti.dot(&r, &r).sqrt();
        self.record(0, res0);
        debug!(mult = l.len(), res0 = ?res0, "projected CG started");
        if !res0.is_finite() {
            return Err(FetiError::NonFinite("initial residual"));
        }
        let rz0 = rz;

        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if !stats.converged {
            for i in 0..self.conv.max_iters {
                feti.apply(&p, &mut tmp);
                feti.project(ProjectionDirection::Transpose, &tmp, &mut q);
                let pq = feti.dot(&p, &q);
                check_curvature(pq, i + 1)?;
                let alpha = K::from_real(rz / pq);
                axpy(alpha, p.as_slice(), l.as_mut_slice());
                axpy(-alpha, q.as_slice(), r.as_mut_slice());

                feti.precond(&r, &mut tmp);
                feti.project(ProjectionDirection::Forward, &tmp, &mut z);
                let res = feti.dot(&r, &r).sqrt();
                self.record(i + 1, res);
                trace!(iteration = i + 1, residual = ?res, "projected CG");
                if !res.is_finite() {
                    return Err(FetiError::NonFinite("residual"));
                }
                let (stop, s) = self.conv.check(res, res0, i + 1);
                stats = s;
                if stop {
                    break;
                }

                let rz_new = feti.dot(&r, &z);
                if let Step::Stagnated = check_rz(rz_new, rz0, i + 1)? {
                    break;
                }
                let beta = rz_new / rz;
                axpby(K::one(), z.as_slice(), K::from_real(beta), p.as_mut_slice());
                rz = rz_new;
            }
        }

        feti.compute_solution(&l, x);
        debug!(iterations = stats.iterations, converged = stats.converged, "projected CG finished");
        Ok(stats)
    }

    /// Same sequence of collectives as [`ProjectedCg::solve_subdomain`].
    fn solve_coarse_only<K, C, O>(&mut self, rank: &mut CoarseOnlyRank<K, C, O>) -> Result<SolveStats<T>, FetiError>
    where
        K: Scalar<Real = T>,
        C: Comm,
        O: CoarseOperator<K>,
    {
        rank.initialize_pcg();
        rank.project();
        let rz0 = rank.dot();
        let res0 = rank.dot().sqrt();
        self.record(0, res0);
        if !res0.is_finite() {
            return Err(FetiError::NonFinite("initial residual"));
        }

        let mut stats = SolveStats { iterations: 0, final_residual: res0, converged: res0 == T::zero() };
        if !stats.converged {
            for i in 0..self.conv.max_iters {
                rank.project();
                let pq = rank.dot();
                check_curvature(pq, i + 1)?;
                rank.project();
                let res = rank.dot().sqrt();
                self.record(i + 1, res);
                if !res.is_finite() {
                    return Err(FetiError::NonFinite("residual"));
                }
                let (stop, s) = self.conv.check(res, res0, i + 1);
                stats = s;
                if stop {
                    break;
                }
                let rz_new = rank.dot();
                if let Step::Stagnated = check_rz(rz_new, rz0, i + 1)? {
                    break;
                }
            }
        }

        rank.compute_solution();
        Ok(stats)
    }
}
