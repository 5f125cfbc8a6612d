//! Dense coarse operator built from all-reductions.
//!
//! Every rank contributes its rows of `E` to a zero-padded `N × N` buffer that is
//! summed over the communicator. The factorization is then either replicated on
//! every rank, or held by a single root that solves on behalf of everyone and
//! returns the solution through a second all-reduction.
//!
//! Suited to coarse spaces of a few hundred unknowns. Larger ones should plug in a
//! distributed [`CoarseOperator`] instead.

use super::{CoarseDistribution, CoarseInfo, CoarseOperator, CoarseParams, CoarseTopology};
use crate::error::FetiError;
use crate::feti::rank::RankRole;
use crate::matrix::dense::{rank_defect, DenseMatrix};
use crate::parallel::Comm;
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, Mat, MatMut};
use tracing::debug;

/// Replicated or centralized LU of the global coarse matrix.
pub struct DenseCoarseOperator {
    info: CoarseInfo,
    distribution: CoarseDistribution,
    rank: usize,
    factor: Option<FullPivLu<f64>>,
}

impl DenseCoarseOperator {
    fn solves_here(&self) -> bool {
        match self.distribution {
            CoarseDistribution::Replicated => true,
            CoarseDistribution::Centralized { root } => root == self.rank,
        }
    }
}

impl CoarseOperator<f64> for DenseCoarseOperator {
    fn build<C: Comm>(
        comm: &C,
        params: &CoarseParams,
        local_size: usize,
        column: &mut dyn FnMut(Option<usize>, &mut [f64]),
    ) -> Result<(Self, CoarseInfo), FetiError> {
        let rank = comm.rank();
        if let CoarseDistribution::Centralized { root } = params.distribution {
            if root >= comm.size() {
                return Err(FetiError::Unsupported("coarse root outside the communicator"));
            }
        }

        let mut sizes = vec![0.0; comm.size()];
        sizes[rank] = local_size as f64;
        comm.all_reduce_into(&mut sizes);
        let sizes: Vec<usize> = sizes.iter().map(|&s| s.round() as usize).collect();
        let offset: usize = sizes[..rank].iter().sum();
        let n: usize = sizes.iter().sum();
        let info = CoarseInfo { global_size: n, offset, local_size };

        // column-major N × N
        let mut e = vec![0.0; n * n];
        let mut rows = vec![0.0; local_size];
        for j in 0..n {
            let owned = (offset..offset + local_size).contains(&j).then(|| j - offset);
            column(owned, &mut rows);
            e[j * n + offset..j * n + offset + local_size].copy_from_slice(&rows);
        }
        comm.all_reduce_into(&mut e);

        if params.topology == CoarseTopology::Symmetric {
            for j in 0..n {
                for i in j + 1..n {
                    let avg = 0.5 * (e[j * n + i] + e[i * n + j]);
                    e[j * n + i] = avg;
                    e[i * n + j] = avg;
                }
            }
        }

        let mut op = DenseCoarseOperator { info, distribution: params.distribution, rank, factor: None };
        if n == 0 {
            return Ok((op, info));
        }
        // [non-finite, singular], summed so that every rank fails together
        let mut status = [0.0; 2];
        if op.solves_here() {
            if e.iter().any(|v| !v.is_finite()) {
                status[0] = 1.0;
            } else {
                let mat = Mat::<f64>::from_raw(n, n, &e);
                let factor = FullPivLu::new(mat.as_ref());
                if rank_defect(&factor) > 0 {
                    status[1] = 1.0;
                }
                op.factor = Some(factor);
            }
        }
        comm.all_reduce_into(&mut status);
        if status[0] > 0.0 {
            return Err(FetiError::Factorization("coarse matrix has non-finite entries".into()));
        }
        if status[1] > 0.0 {
            return Err(FetiError::Factorization(format!(
                "coarse matrix of order {n} is singular, the coarse basis is rank deficient"
            )));
        }
        debug!(global_size = n, offset, local_size, "coarse operator factorized");
        Ok((op, info))
    }

    fn local_size(&self) -> usize {
        self.info.local_size
    }

    fn info(&self) -> CoarseInfo {
        self.info
    }

    fn solve<C: Comm>(&self, comm: &C, role: RankRole, rhs: &mut [f64]) {
        debug_assert!(role == RankRole::Subdomain || rhs.is_empty());
        debug_assert_eq!(rhs.len(), self.info.local_size);
        let n = self.info.global_size;
        if n == 0 {
            return;
        }
        let range = self.info.offset..self.info.offset + self.info.local_size;
        let mut buf = vec![0.0; n];
        buf[range.clone()].copy_from_slice(rhs);
        comm.all_reduce_into(&mut buf);
        match &self.factor {
            Some(factor) => {
                let x = MatMut::from_column_major_slice_mut(&mut buf, n, 1);
                factor.solve_in_place_with_conj(Conj::No, x);
            }
            None => buf.iter_mut().for_each(|v| *v = 0.0),
        }
        if let CoarseDistribution::Centralized { .. } = self.distribution {
            comm.all_reduce_into(&mut buf);
        }
        rhs.copy_from_slice(&buf[range]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};
    use approx::assert_abs_diff_eq;
    use std::thread;

    #[test]
    fn serial_build_and_solve() {
        // E = [[2, 1], [1, 3]]
        let e = [[2.0, 1.0], [1.0, 3.0]];
        let (op, info) = DenseCoarseOperator::build(&SerialComm, &CoarseParams::default(), 2, &mut |k, out| {
            let k = k.unwrap();
            out[0] = e[0][k];
            out[1] = e[1][k];
        })
        .unwrap();
        assert_eq!(info, CoarseInfo { global_size: 2, offset: 0, local_size: 2 });
        let mut rhs = vec![3.0, 4.0];
        op.solve(&SerialComm, RankRole::Subdomain, &mut rhs);
        assert_abs_diff_eq!(rhs[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rhs[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn centralized_solve_with_coarse_only_root() {
        // Ranks 0 and 1 own one coarse unknown each, rank 2 only factorizes.
        // E = [[4, 1], [1, 2]], rhs = [5, 3] → [1, 1].
        let comms = ThreadComm::universe(3);
        let params = CoarseParams::default().with_distribution(CoarseDistribution::Centralized { root: 2 });
        let results: Vec<Vec<f64>> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let local = if rank < 2 { 1 } else { 0 };
                        let e = [[4.0, 1.0], [1.0, 2.0]];
                        let mut j = 0;
                        let (op, info) = DenseCoarseOperator::build(&comm, &params, local, &mut |_, out| {
                            if rank < 2 {
                                out[0] = e[rank][j];
                            }
                            j += 1;
                        })
                        .unwrap();
                        assert_eq!(info.global_size, 2);
                        let mut rhs = if rank == 0 { vec![5.0] } else if rank == 1 { vec![3.0] } else { vec![] };
                        let role = if rank < 2 { RankRole::Subdomain } else { RankRole::CoarseOnly };
                        op.solve(&comm, role, &mut rhs);
                        rhs
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_abs_diff_eq!(results[0][0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(results[1][0], 1.0, epsilon = 1e-12);
        assert!(results[2].is_empty());
    }

    #[test]
    fn singular_coarse_matrix_fails_on_every_rank() {
        // E = [[1, 2], [2, 4]] assembled by two ranks, factorized on rank 0 only
        let comms = ThreadComm::universe(2);
        let params = CoarseParams::default().with_distribution(CoarseDistribution::Centralized { root: 0 });
        let results: Vec<bool> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let e = [[1.0, 2.0], [2.0, 4.0]];
                        let mut j = 0;
                        let result = DenseCoarseOperator::build(&comm, &params, 1, &mut |_, out| {
                            out[0] = e[rank][j];
                            j += 1;
                        });
                        matches!(result, Err(FetiError::Factorization(_)))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results, vec![true, true]);
    }

    #[test]
    fn root_outside_communicator_is_rejected() {
        let params = CoarseParams::default().with_distribution(CoarseDistribution::Centralized { root: 4 });
        let result = DenseCoarseOperator::build(&SerialComm, &params, 0, &mut |_, _| {});
        assert!(matches!(result, Err(FetiError::Unsupported(_))));
    }
}
