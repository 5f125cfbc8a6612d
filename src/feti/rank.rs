//! Rank roles.
//!
//! A solver communicator may hold ranks that own no subdomain and only take part in
//! coarse solves and global reductions. The role is decided once, when the rank is
//! set up, and the driver dispatches on [`FetiRank`] instead of checking a flag in
//! every primitive.

use super::Feti;
use crate::coarse::{CoarseInfo, CoarseOperator, CoarseParams};
use crate::core::traits::Scalar;
use crate::error::FetiError;
use crate::parallel::Comm;
use std::marker::PhantomData;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RankRole {
    /// Owns a subdomain.
    Subdomain,
    /// Only takes part in collectives.
    CoarseOnly,
}

/// A rank without a subdomain.
///
/// Each method performs exactly the collective calls its subdomain counterpart on
/// [`Feti`] performs, contributing nothing.
pub struct CoarseOnlyRank<K, C, O> {
    comm: C,
    coarse: Option<O>,
    _scalar: PhantomData<K>,
}

impl<K: Scalar, C: Comm, O: CoarseOperator<K>> CoarseOnlyRank<K, C, O> {
    pub fn new(comm: C) -> Self {
        Self { comm, coarse: None, _scalar: PhantomData }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn coarse_operator(&self) -> Option<&O> {
        self.coarse.as_ref()
    }

    pub fn build_coarse_operator(&mut self, params: &CoarseParams) -> Result<CoarseInfo, FetiError> {
        let (op, info) = O::build(&self.comm, params, 0, &mut |_, _| {})?;
        debug!(global_size = info.global_size, "coarse-only rank joined the coarse build");
        self.coarse = Some(op);
        Ok(info)
    }

    fn coarse_solve(&self) {
        if let Some(coarse) = &self.coarse {
            coarse.solve(&self.comm, RankRole::CoarseOnly, &mut []);
        }
    }

    /// Counterpart of [`Feti::initialize_pcg`]: the initial coarse correction and the
    /// projection of the residual.
    pub fn initialize_pcg(&mut self) {
        self.coarse_solve();
        self.coarse_solve();
    }

    /// Counterpart of [`Feti::project`].
    pub fn project(&mut self) {
        self.coarse_solve();
    }

    /// Counterpart of [`Feti::compute_solution`].
    pub fn compute_solution(&mut self) {
        self.coarse_solve();
    }

    /// Counterpart of [`Feti::dot`]; contributes zero.
    pub fn dot(&self) -> K::Real {
        let s = self.comm.all_reduce(0.0);
        <K::Real as num_traits::FromPrimitive>::from_f64(s).unwrap_or_else(num_traits::Float::nan)
    }
}

/// The two roles a rank of the solver communicator can play.
pub enum FetiRank<K: Scalar, C, L, O> {
    Subdomain(Box<Feti<K, C, L, O>>),
    CoarseOnly(CoarseOnlyRank<K, C, O>),
}

impl<K: Scalar, C, L, O> FetiRank<K, C, L, O> {
    pub fn role(&self) -> RankRole {
        match self {
            FetiRank::Subdomain(_) => RankRole::Subdomain,
            FetiRank::CoarseOnly(_) => RankRole::CoarseOnly,
        }
    }
}
