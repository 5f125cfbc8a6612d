//! FETI solver primitives.
//!
//! [`Feti`] owns one subdomain (its interface maps, its local factorizations and
//! its scratch buffers) and exposes the per-iteration building blocks of a projected
//! conjugate gradient on the Lagrange multipliers:
//!
//! - [`Feti::apply`]: the interface operator `F = B K⁻¹ Bᵀ`,
//! - [`Feti::precond`]: the preconditioner `Q = B D⁻¹ S̃ D⁻¹ Bᵀ`,
//! - [`Feti::project`]: the coarse projections `P = I − Q G E⁻¹ Gᵀ` and
//!   `Pᵀ = I − G E⁻¹ Gᵀ Q`,
//! - [`Feti::dot`]: the global inner product of two dual vectors,
//! - [`Feti::initialize_pcg`] and [`Feti::compute_solution`]: the particular
//!   solution and the recovery of the primal unknowns.
//!
//! `G = B R` where the columns of `R` span the coarse space, and `E = Gᵀ Q G` is
//! held by a [`CoarseOperator`]. When the projection builder is
//! [`ProjectionBuilder::Simple`] the metric `Q` above is replaced by the identity.
//!
//! Ranks without a subdomain use [`CoarseOnlyRank`], which performs the same
//! collective calls.

pub mod jump;
pub mod rank;
pub mod scaling;

pub use jump::JumpOperator;
pub use rank::{CoarseOnlyRank, FetiRank, RankRole};
pub use scaling::Scaling;

use crate::coarse::{
    BasisSupport, CoarseBasis, CoarseInfo, CoarseOperator, CoarseParams, EigenSolver, ProjectionBuilder,
};
use crate::config::options::{FetiOptions, FetiPreconditioner, ScalingKind};
use crate::core::traits::Scalar;
use crate::core::wrappers::{axpy, dot};
use crate::error::FetiError;
use crate::parallel::{Comm, NeighborExchange};
use crate::schur::{LocalSolver, Schur};
use crate::subdomain::{DualVector, Subdomain};
use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which of the two coarse projections to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionDirection {
    /// `P = I − Q G E⁻¹ Gᵀ`
    Forward,
    /// `Pᵀ = I − G E⁻¹ Gᵀ Q`
    Transpose,
}

/// FETI solver state of one subdomain.
pub struct Feti<K: Scalar, C, L, O> {
    subdomain: Subdomain<C>,
    schur: Schur<K, L>,
    options: FetiOptions,
    builder: ProjectionBuilder,
    scaling: Scaling<K::Real>,
    basis: Option<CoarseBasis<K>>,
    /// Interface rows of `basis`.
    interface_basis: Option<CoarseBasis<K>>,
    coarse: Option<O>,
    primal: Vec<K>,
    recv: Vec<K>,
    work: Vec<K>,
    structure: Vec<K>,
}

/// u ← Q u, with `Q = B_D S̃ B_Dᵀ` for the local action of `variant`.
#[allow(clippy::too_many_arguments)]
fn precondition<K, C, L>(
    subdomain: &Subdomain<C>,
    scaling: &Scaling<K::Real>,
    schur: &mut Schur<K, L>,
    variant: FetiPreconditioner,
    primal: &mut [K],
    recv: &mut [K],
    u: &mut [K],
) where
    K: Scalar,
    C: NeighborExchange<K>,
    L: LocalSolver<K>,
{
    let jump = JumpOperator::new(subdomain, Some(scaling.weights()));
    jump.reduce(u, primal);
    schur.apply_local(variant, primal);
    jump.expand(primal, u, recv);
}

/// u ← M u with `M` the metric of the coarse problem.
#[allow(clippy::too_many_arguments)]
fn apply_metric<K, C, L>(
    builder: ProjectionBuilder,
    subdomain: &Subdomain<C>,
    scaling: &Scaling<K::Real>,
    schur: &mut Schur<K, L>,
    variant: FetiPreconditioner,
    primal: &mut [K],
    recv: &mut [K],
    u: &mut [K],
) where
    K: Scalar,
    C: NeighborExchange<K>,
    L: LocalSolver<K>,
{
    if builder == ProjectionBuilder::Standard {
        precondition(subdomain, scaling, schur, variant, primal, recv, u);
    }
}

fn interface_rows<K: Scalar>(basis: &CoarseBasis<K>, interior: usize) -> CoarseBasis<K> {
    match basis.support() {
        BasisSupport::Interface => basis.clone(),
        BasisSupport::Full => basis.restrict(interior),
    }
}

impl<K, C, L, O> Feti<K, C, L, O>
where
    K: Scalar,
    C: Comm + NeighborExchange<K>,
    L: LocalSolver<K>,
    O: CoarseOperator<K>,
{
    /// Allocate the scratch buffers and build the scaling.
    ///
    /// With [`ScalingKind::Coefficient`] no coefficient is known yet, so the weights
    /// start from multiplicity; pass one to [`Feti::build_scaling`].
    pub fn new(subdomain: Subdomain<C>, schur: Schur<K, L>, options: FetiOptions) -> Result<Self, FetiError> {
        FetiError::check_len("interface unknowns", subdomain.dof(), schur.dof())?;
        let mult = subdomain.mult();
        let n = schur.size();
        let dof = subdomain.dof();
        let scaling = Scaling::multiplicity(&subdomain);
        let mut feti = Self {
            builder: ProjectionBuilder::for_preconditioner(options.preconditioner),
            options,
            scaling,
            basis: None,
            interface_basis: None,
            coarse: None,
            primal: vec![K::zero(); dof],
            recv: vec![K::zero(); mult],
            work: vec![K::zero(); mult],
            structure: vec![K::zero(); n],
            subdomain,
            schur,
        };
        feti.build_scaling(None)?;
        Ok(feti)
    }

    /// Recompute the partition of unity. `rho` is a coefficient per local unknown,
    /// used by [`ScalingKind::Coefficient`].
    ///
    /// Collective with the neighbors for the stiffness and coefficient policies.
    pub fn build_scaling(&mut self, rho: Option<&[K]>) -> Result<(), FetiError> {
        let m = self.schur.interior();
        self.scaling = match (self.options.scaling, rho) {
            (ScalingKind::Stiffness, _) => {
                let mut diagonal = vec![K::zero(); self.subdomain.dof()];
                self.schur.stiffness_scaling(&mut diagonal);
                Scaling::from_coefficient(&self.subdomain, &diagonal)
            }
            (ScalingKind::Coefficient, Some(rho)) => {
                FetiError::check_len("coefficient", self.schur.size(), rho.len())?;
                Scaling::from_coefficient(&self.subdomain, &rho[m..])
            }
            (ScalingKind::Coefficient, None) | (ScalingKind::Multiplicity, _) => {
                Scaling::multiplicity(&self.subdomain)
            }
        };
        debug!(
            policy = ?self.options.scaling,
            with_coefficient = rho.is_some(),
            mult = self.subdomain.mult(),
            "partition of unity built"
        );
        Ok(())
    }

    pub fn subdomain(&self) -> &Subdomain<C> {
        &self.subdomain
    }

    pub fn schur(&self) -> &Schur<K, L> {
        &self.schur
    }

    pub fn options(&self) -> &FetiOptions {
        &self.options
    }

    pub fn scaling(&self) -> &Scaling<K::Real> {
        &self.scaling
    }

    pub fn projection_builder(&self) -> ProjectionBuilder {
        self.builder
    }

    pub fn coarse_operator(&self) -> Option<&O> {
        self.coarse.as_ref()
    }

    /// Layout of the coarse problem, once [`Feti::build_coarse_operator`] has run.
    pub fn coarse_info(&self) -> Result<CoarseInfo, FetiError> {
        self.coarse.as_ref().map(O::info).ok_or(FetiError::CoarseOperatorMissing)
    }

    pub fn coarse_basis(&self) -> Option<&CoarseBasis<K>> {
        self.basis.as_ref()
    }

    /// Number of local coarse vectors.
    pub fn deficiency(&self) -> usize {
        self.basis.as_ref().map_or(0, CoarseBasis::nu)
    }

    pub fn allocate_dual(&self) -> DualVector<K> {
        DualVector::zeros(Arc::clone(self.subdomain.layout()))
    }

    pub fn allocate_duals(&self, n: usize) -> Vec<DualVector<K>> {
        (0..n).map(|_| self.allocate_dual()).collect()
    }

    /// Set user deficiency modes (e.g. rigid-body modes), `data` column-major with
    /// one column of length `n` per mode. Invalidates the coarse operator.
    pub fn set_deficiency_basis(&mut self, data: Vec<K>) -> Result<(), FetiError> {
        let basis = CoarseBasis::new(BasisSupport::Full, self.schur.size(), data)?;
        self.interface_basis = Some(interface_rows(&basis, self.schur.interior()));
        self.basis = Some(basis);
        self.coarse = None;
        Ok(())
    }

    /// Drop the coarse basis and the coarse operator.
    pub fn clear_coarse_space(&mut self) {
        self.basis = None;
        self.interface_basis = None;
        self.coarse = None;
    }

    /// out ← Q input
    pub fn precond(&mut self, input: &DualVector<K>, out: &mut DualVector<K>) {
        out.copy_from(input);
        self.precond_in_place(out);
    }

    /// u ← Q u
    pub fn precond_in_place(&mut self, u: &mut DualVector<K>) {
        precondition(
            &self.subdomain,
            &self.scaling,
            &mut self.schur,
            self.options.preconditioner,
            &mut self.primal,
            &mut self.recv,
            u.as_mut_slice(),
        );
    }

    /// Apply the local action of the preconditioner to `n` interface vectors.
    pub fn apply_local_preconditioner_many(&mut self, u: &mut [K], n: usize) {
        self.schur.apply_local_many(self.options.preconditioner, u, n);
    }

    /// out ← F input
    pub fn apply(&mut self, input: &DualVector<K>, out: &mut DualVector<K>) {
        out.copy_from(input);
        self.apply_in_place(out);
    }

    /// u ← F u, with `F = B K⁻¹ Bᵀ` restricted to the interface.
    pub fn apply_in_place(&mut self, u: &mut DualVector<K>) {
        let jump = JumpOperator::<C, K::Real>::new(&self.subdomain, None);
        jump.reduce(u.as_slice(), &mut self.primal);
        self.schur.solve_interface(&mut self.primal);
        jump.expand(&self.primal, u.as_mut_slice(), &mut self.recv);
    }

    /// Global inner product `½ Σ Re(conj(a) b)`. Collective over the whole communicator.
    pub fn dot(&self, a: &DualVector<K>, b: &DualVector<K>) -> K::Real {
        let local = dot(a.as_slice(), b.as_slice()).re();
        let half = local.to_f64().unwrap_or(f64::NAN) * 0.5;
        let global = self.subdomain.comm().all_reduce(half);
        <K::Real as FromPrimitive>::from_f64(global).unwrap_or_else(<K::Real as Float>::nan)
    }

    /// u ← M G E⁻¹ Gᵀ u (forward) or u ← G E⁻¹ Gᵀ M u (transpose), in place.
    ///
    /// Returns `false` only when no coarse operator exists. A rank without a basis
    /// contributes nothing to the coarse right-hand side but still takes part in
    /// every exchange, so the correction it receives from its neighbors is kept.
    fn coarse_correction(&mut self, direction: ProjectionDirection, u: &mut [K]) -> bool {
        let Some(coarse) = &self.coarse else {
            return false;
        };
        let variant = self.options.preconditioner;
        if direction == ProjectionDirection::Transpose {
            apply_metric(
                self.builder,
                &self.subdomain,
                &self.scaling,
                &mut self.schur,
                variant,
                &mut self.primal,
                &mut self.recv,
                u,
            );
        }
        let jump = JumpOperator::<C, K::Real>::new(&self.subdomain, None);
        match &self.interface_basis {
            Some(basis) => {
                jump.reduce(u, &mut self.primal);
                let mut uc = vec![K::zero(); basis.nu()];
                basis.apply_transpose(&self.primal, &mut uc);
                coarse.solve(self.subdomain.comm(), RankRole::Subdomain, &mut uc);
                basis.apply(&uc, &mut self.primal);
            }
            None => {
                coarse.solve(self.subdomain.comm(), RankRole::Subdomain, &mut []);
                self.primal.iter_mut().for_each(|v| *v = K::zero());
            }
        }
        jump.expand(&self.primal, u, &mut self.recv);
        if direction == ProjectionDirection::Forward {
            apply_metric(
                self.builder,
                &self.subdomain,
                &self.scaling,
                &mut self.schur,
                variant,
                &mut self.primal,
                &mut self.recv,
                u,
            );
        }
        true
    }

    /// out ← P input (forward) or out ← Pᵀ input (transpose).
    ///
    /// With [`ProjectionBuilder::Simple`] (superlumped or no preconditioner) the
    /// metric is the identity, so `P = Pᵀ = I − G E⁻¹ Gᵀ` is the orthogonal
    /// projector onto `ker Gᵀ`. With [`ProjectionBuilder::Standard`] it is oblique.
    ///
    /// Without a coarse operator this is a copy. Collective: one coarse solve and
    /// the neighbor exchanges of `B` and of the metric, on every rank.
    pub fn project(&mut self, direction: ProjectionDirection, input: &DualVector<K>, out: &mut DualVector<K>) {
        out.copy_from(input);
        if self.coarse_correction(direction, out.as_mut_slice()) {
            for (o, &i) in out.as_mut_slice().iter_mut().zip(input.as_slice()) {
                *o = i - *o;
            }
        }
    }

    /// u ← u − 2·(coarse correction of u), i.e. the reflection `2P − I` (or `2Pᵀ − I`).
    ///
    /// Without a coarse operator this is a no-op.
    pub fn project_in_place(&mut self, direction: ProjectionDirection, u: &mut DualVector<K>) {
        if self.coarse.is_none() {
            return;
        }
        let mut tmp = std::mem::take(&mut self.work);
        tmp.copy_from_slice(u.as_slice());
        if self.coarse_correction(direction, &mut tmp) {
            let two = K::one() + K::one();
            axpy(-two, &tmp, u.as_mut_slice());
        }
        self.work = tmp;
    }

    /// Particular solution and initial residual.
    ///
    /// On return `x = K⁻¹ f`, `l` holds the initial multipliers and `r` the initial
    /// dual residual. Without a coarse space `l = 0` and `r = B x_b`. With one,
    /// `l = M G E⁻¹ e` (`e = Rᵀ f`, condensed on the interface for interface-supported
    /// bases) and `r = Pᵀ B (x_b − (K⁻¹ [0; Bᵀ l])_b)`.
    ///
    /// Collective: two coarse solves when a coarse operator exists.
    pub fn initialize_pcg(&mut self, f: &[K], x: &mut [K], l: &mut DualVector<K>, r: &mut DualVector<K>) {
        debug_assert_eq!(f.len(), self.schur.size());
        debug_assert_eq!(x.len(), self.schur.size());
        let m = self.schur.interior();
        let jump = JumpOperator::<C, K::Real>::new(&self.subdomain, None);

        if let Some(coarse) = &self.coarse {
            let mut uc = vec![K::zero(); coarse.local_size()];
            if let Some(basis) = &self.basis {
                match basis.support() {
                    BasisSupport::Full => basis.apply_transpose(f, &mut uc),
                    BasisSupport::Interface => {
                        let mut g = vec![K::zero(); self.subdomain.dof()];
                        self.schur.condense(f, &mut g);
                        basis.apply_transpose(&g, &mut uc);
                    }
                }
            }
            coarse.solve(self.subdomain.comm(), RankRole::Subdomain, &mut uc);
            match &self.interface_basis {
                Some(basis) => basis.apply(&uc, &mut self.primal),
                None => self.primal.iter_mut().for_each(|v| *v = K::zero()),
            }
            jump.expand(&self.primal, l.as_mut_slice(), &mut self.recv);
            apply_metric(
                self.builder,
                &self.subdomain,
                &self.scaling,
                &mut self.schur,
                self.options.preconditioner,
                &mut self.primal,
                &mut self.recv,
                l.as_mut_slice(),
            );
            jump.reduce(l.as_slice(), &mut self.primal);
            self.schur.solve_interface(&mut self.primal);
        }

        self.schur.solve(f, x);

        if self.coarse.is_none() {
            l.fill_zero();
            jump.expand(&x[m..], r.as_mut_slice(), &mut self.recv);
            return;
        }
        for (p, &xb) in self.primal.iter_mut().zip(&x[m..]) {
            *p = xb - *p;
        }
        jump.expand(&self.primal, r.as_mut_slice(), &mut self.recv);
        let mut projected = DualVector::zeros(Arc::clone(self.subdomain.layout()));
        self.project(ProjectionDirection::Transpose, r, &mut projected);
        r.copy_from(&projected);
    }

    /// Primal solution from converged multipliers: `x ← x − K⁻¹ [0; Bᵀ l]`, followed by
    /// the coarse correction `R E⁻¹ Rᵀ Bᵀ M B x_b` when a coarse operator exists.
    ///
    /// Collective: one coarse solve when a coarse operator exists.
    pub fn compute_solution(&mut self, l: &DualVector<K>, x: &mut [K]) {
        debug_assert_eq!(x.len(), self.schur.size());
        let m = self.schur.interior();
        let jump = JumpOperator::<C, K::Real>::new(&self.subdomain, None);
        jump.reduce(l.as_slice(), &mut self.primal);
        self.schur.solve_from_interface(&self.primal, &mut self.structure);
        axpy(-K::one(), &self.structure, x);

        let Some(coarse) = &self.coarse else {
            return;
        };
        let mut dual = std::mem::take(&mut self.work);
        jump.expand(&x[m..], &mut dual, &mut self.recv);
        apply_metric(
            self.builder,
            &self.subdomain,
            &self.scaling,
            &mut self.schur,
            self.options.preconditioner,
            &mut self.primal,
            &mut self.recv,
            &mut dual,
        );
        match (&self.basis, &self.interface_basis) {
            (Some(basis), Some(interface)) => {
                jump.reduce(&dual, &mut self.primal);
                let mut uc = vec![K::zero(); interface.nu()];
                interface.apply_transpose(&self.primal, &mut uc);
                coarse.solve(self.subdomain.comm(), RankRole::Subdomain, &mut uc);
                match basis.support() {
                    BasisSupport::Interface => {
                        basis.apply(&uc, &mut self.primal);
                        self.schur.subtract_harmonic_extension(&self.primal, x);
                    }
                    BasisSupport::Full => {
                        basis.apply(&uc, &mut self.structure);
                        axpy(-K::one(), &self.structure, x);
                    }
                }
            }
            _ => coarse.solve(self.subdomain.comm(), RankRole::Subdomain, &mut []),
        }
        self.work = dual;
    }

    /// Assemble and factorize `E = Gᵀ M G`. Collective over every rank.
    ///
    /// For a user basis, `params.nu > 0` keeps only the first `nu` modes.
    pub fn build_coarse_operator(&mut self, params: &CoarseParams) -> Result<CoarseInfo, FetiError> {
        if let (Some(basis), Some(interface)) = (&mut self.basis, &mut self.interface_basis) {
            if basis.support() == BasisSupport::Full && params.nu > 0 && params.nu < basis.nu() {
                basis.truncate(params.nu);
                interface.truncate(params.nu);
            }
        }
        let local_size = self.interface_basis.as_ref().map_or(0, CoarseBasis::nu);
        let variant = self.options.preconditioner;
        let Self { subdomain, schur, builder, scaling, interface_basis, coarse, primal, recv, work, .. } = self;
        let builder = *builder;
        let jump = JumpOperator::<C, K::Real>::new(subdomain, None);
        let mut column = |k: Option<usize>, out: &mut [K]| {
            match (k, interface_basis.as_ref()) {
                (Some(k), Some(basis)) => primal.copy_from_slice(basis.column(k)),
                _ => primal.iter_mut().for_each(|v| *v = K::zero()),
            }
            jump.expand(primal, work, recv);
            apply_metric(builder, subdomain, scaling, schur, variant, primal, recv, work);
            jump.reduce(work, primal);
            if let Some(basis) = interface_basis.as_ref() {
                basis.apply_transpose(primal, out);
            }
        };
        let (op, info) = O::build(subdomain.comm(), params, local_size, &mut column)?;
        *coarse = Some(op);
        debug!(
            builder = ?builder,
            global_size = info.global_size,
            local_size = info.local_size,
            "coarse operator built"
        );
        Ok(info)
    }

    /// Adaptive coarse space from the local GenEO eigenproblem.
    ///
    /// Keeps at most `nu` eigenvectors with eigenvalue below `threshold` as an
    /// interface-supported basis and returns how many were kept. When none qualifies
    /// the basis is released. Either way the coarse operator must be rebuilt.
    pub fn solve_gevp<E: EigenSolver<K>>(
        &mut self,
        eigensolver: &mut E,
        nu: usize,
        threshold: K::Real,
    ) -> Result<usize, FetiError> {
        let dof = self.subdomain.dof();
        let weights = self.scaling.per_dof(&self.subdomain);
        let schur = self.schur.dense_schur_complement();
        let mut diagonal = vec![K::zero(); dof];
        self.schur.stiffness_scaling(&mut diagonal);
        let modes = eigensolver.solve(dof, &schur, &diagonal, &weights, nu, threshold)?;
        self.coarse = None;
        if modes.is_empty() {
            if self.basis.is_some() {
                warn!("GenEO selected no eigenvector, releasing the adaptive coarse basis");
            }
            self.basis = None;
            self.interface_basis = None;
            return Ok(0);
        }
        let basis = CoarseBasis::new(BasisSupport::Interface, dof, modes.vectors)?;
        let kept = basis.nu();
        self.interface_basis = Some(basis.clone());
        self.basis = Some(basis);
        debug!(kept, "adaptive coarse basis updated");
        Ok(kept)
    }
}
