//! Coarse space: basis, projection builders and the coarse operator interface.
//!
//! The coarse problem couples every subdomain through a small dense system
//! `E = Gᵀ Q G` with `G = B R`, where the columns of `R` are the local coarse
//! basis vectors (rigid-body modes or GenEO eigenvectors) and `Q` is the metric
//! chosen by the [`ProjectionBuilder`]. Assembly and factorization are collective
//! and owned by a [`CoarseOperator`]; the FETI core only asks it for its local
//! size and for solves.

pub mod dense;
pub mod geneo;

pub use dense::DenseCoarseOperator;
pub use geneo::{DenseGeneo, EigenSolver, GeneoModes};

use crate::config::options::FetiPreconditioner;
use crate::core::traits::Scalar;
use crate::core::wrappers::{gemv, gemv_transpose};
use crate::error::FetiError;
use crate::feti::rank::RankRole;
use crate::parallel::Comm;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Symmetry of the assembled coarse matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum CoarseTopology {
    #[default]
    General,
    /// Symmetrize the assembled matrix before factorizing it.
    Symmetric,
}

/// Where the coarse factorization lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum CoarseDistribution {
    /// Every rank factorizes and solves the whole coarse system.
    #[default]
    Replicated,
    /// Only `root` factorizes; solutions are broadcast back.
    Centralized { root: usize },
}

/// Named parameters of the coarse operator build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoarseParams {
    /// Number of local coarse vectors (GenEO target, or truncation of a user basis; 0 keeps all).
    pub nu: usize,
    pub topology: CoarseTopology,
    pub distribution: CoarseDistribution,
}

impl CoarseParams {
    pub fn with_nu(mut self, nu: usize) -> Self {
        self.nu = nu;
        self
    }

    pub fn with_topology(mut self, topology: CoarseTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_distribution(mut self, distribution: CoarseDistribution) -> Self {
        self.distribution = distribution;
        self
    }
}

/// Metric of the coarse problem and of the projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionBuilder {
    /// `E = Gᵀ Q G` with `Q` the FETI preconditioner.
    Standard,
    /// `E = Gᵀ G`.
    Simple,
}

impl ProjectionBuilder {
    pub fn for_preconditioner(preconditioner: FetiPreconditioner) -> Self {
        match preconditioner {
            FetiPreconditioner::Dirichlet | FetiPreconditioner::Lumped => Self::Standard,
            FetiPreconditioner::Superlumped | FetiPreconditioner::None => Self::Simple,
        }
    }
}

/// Result of a coarse build, as seen from one rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoarseInfo {
    /// Order of the global coarse matrix.
    pub global_size: usize,
    /// First row owned by this rank.
    pub offset: usize,
    /// Number of rows owned by this rank.
    pub local_size: usize,
}

/// Support of the local coarse basis vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisSupport {
    /// Interface vectors of length `dof` (adaptive GenEO modes).
    Interface,
    /// Vectors over the whole subdomain, length `n` (deficiency modes).
    Full,
}

/// Local columns of the coarse space, stored column-major.
#[derive(Clone, Debug, PartialEq)]
pub struct CoarseBasis<K> {
    support: BasisSupport,
    rows: usize,
    cols: usize,
    data: Vec<K>,
}

impl<K: Scalar> CoarseBasis<K> {
    pub fn new(support: BasisSupport, rows: usize, data: Vec<K>) -> Result<Self, FetiError> {
        if rows == 0 || data.len() % rows != 0 {
            return Err(FetiError::DimensionMismatch {
                what: "coarse basis storage",
                expected: rows * (data.len() / rows.max(1)).max(1),
                found: data.len(),
            });
        }
        let cols = data.len() / rows;
        Ok(Self { support, rows, cols, data })
    }

    /// Restriction of a basis to its last `rows - skip` rows; may be empty.
    pub(crate) fn restrict(&self, skip: usize) -> Self {
        let rows = self.rows - skip;
        let data = self
            .data
            .chunks(self.rows)
            .flat_map(|column| column[skip..].iter().copied())
            .collect();
        Self { support: BasisSupport::Interface, rows, cols: self.cols, data }
    }

    pub fn support(&self) -> BasisSupport {
        self.support
    }

    /// Length of each basis vector.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of basis vectors.
    pub fn nu(&self) -> usize {
        self.cols
    }

    pub fn column(&self, k: usize) -> &[K] {
        &self.data[k * self.rows..(k + 1) * self.rows]
    }

    pub fn as_slice(&self) -> &[K] {
        &self.data
    }

    /// Keep the first `nu` columns.
    pub fn truncate(&mut self, nu: usize) {
        self.cols = self.cols.min(nu);
        self.data.truncate(self.cols * self.rows);
    }

    /// y ← R uc
    pub fn apply(&self, uc: &[K], y: &mut [K]) {
        gemv(&self.data, self.rows, self.nu(), uc, y);
    }

    /// uc ← Rᵀ v
    pub fn apply_transpose(&self, v: &[K], uc: &mut [K]) {
        gemv_transpose(&self.data, self.rows, self.nu(), v, uc);
    }
}

/// Assembled and factorized global coarse problem.
///
/// All methods taking a communicator are collective over every rank, coarse-only
/// ranks included, and must be called in the same order everywhere.
pub trait CoarseOperator<K: Scalar>: Sized {
    /// Assemble and factorize `E`.
    ///
    /// For each global coarse column, in the same order on every rank, `column` is
    /// called with the local basis index when this rank owns that column (`None`
    /// otherwise) and must fill the local rows of `E e_j`.
    ///
    /// A singular `E` (linearly dependent jumps of the coarse basis) is an error on
    /// every rank.
    fn build<C: Comm>(
        comm: &C,
        params: &CoarseParams,
        local_size: usize,
        column: &mut dyn FnMut(Option<usize>, &mut [K]),
    ) -> Result<(Self, CoarseInfo), FetiError>;

    /// Number of coarse unknowns owned by this rank.
    fn local_size(&self) -> usize;

    fn info(&self) -> CoarseInfo;

    /// rhs ← E⁻¹ rhs on the local rows. `rhs` is empty on coarse-only ranks.
    fn solve<C: Comm>(&self, comm: &C, role: RankRole, rhs: &mut [K]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_follows_preconditioner() {
        assert_eq!(ProjectionBuilder::for_preconditioner(FetiPreconditioner::Dirichlet), ProjectionBuilder::Standard);
        assert_eq!(ProjectionBuilder::for_preconditioner(FetiPreconditioner::Lumped), ProjectionBuilder::Standard);
        assert_eq!(ProjectionBuilder::for_preconditioner(FetiPreconditioner::Superlumped), ProjectionBuilder::Simple);
        assert_eq!(ProjectionBuilder::for_preconditioner(FetiPreconditioner::None), ProjectionBuilder::Simple);
    }

    #[test]
    fn basis_products() {
        // R = [[1, 0], [1, 1], [1, 2]]
        let mut basis = CoarseBasis::new(BasisSupport::Full, 3, vec![1.0, 1.0, 1.0, 0.0, 1.0, 2.0]).unwrap();
        assert_eq!(basis.nu(), 2);
        let mut y = vec![0.0; 3];
        basis.apply(&[2.0, 1.0], &mut y);
        assert_eq!(y, vec![2.0, 3.0, 4.0]);
        let mut uc = vec![0.0; 2];
        basis.apply_transpose(&[1.0, 1.0, 1.0], &mut uc);
        assert_eq!(uc, vec![3.0, 3.0]);
        basis.truncate(1);
        assert_eq!(basis.nu(), 1);
        assert_eq!(basis.column(0), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn basis_rejects_ragged_storage() {
        assert!(CoarseBasis::new(BasisSupport::Interface, 2, vec![1.0; 3]).is_err());
        assert!(CoarseBasis::<f64>::new(BasisSupport::Interface, 0, vec![]).is_err());
    }
}
