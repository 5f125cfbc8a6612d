//! Partition of unity on the interface.
//!
//! One real weight per dual unknown, laid out like a [`DualVector`]. The weights
//! of all subdomains sharing a DOF sum to one:
//! - multiplicity: `1 / (1 + references)`, where a DOF shared with `n − 1`
//!   neighbors has `n − 1` references,
//! - coefficient ratio: `ρ_neighbor / Σ ρ`, from one exchange of the interface
//!   coefficient.
//!
//! [`DualVector`]: crate::subdomain::DualVector

use crate::core::traits::Scalar;
use crate::parallel::{Comm, NeighborExchange};
use crate::subdomain::{DualVector, Subdomain};
use num_traits::Float;
use std::sync::Arc;

/// Weights of the scaled jump operator, owned independently of any dual buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Scaling<R> {
    weights: Vec<R>,
}

impl<R: Float> Scaling<R> {
    pub fn multiplicity<C>(subdomain: &Subdomain<C>) -> Self {
        let count = subdomain.multiplicity();
        let mut weights = Vec::with_capacity(subdomain.mult());
        for neighbor in subdomain.neighbors() {
            for &idx in &neighbor.indices {
                let c = R::from(count[idx]).unwrap_or_else(R::one);
                weights.push(R::one() / (R::one() + c));
            }
        }
        Self { weights }
    }

    /// Coefficient-ratio weights from the interface values `coefficient` (length `dof`).
    ///
    /// A DOF whose accumulated coefficient vanishes keeps its multiplicity weight.
    pub fn from_coefficient<K, C>(subdomain: &Subdomain<C>, coefficient: &[K]) -> Self
    where
        K: Scalar<Real = R>,
        C: Comm + NeighborExchange<K>,
    {
        debug_assert_eq!(coefficient.len(), subdomain.dof());
        let mut sum = coefficient.to_vec();
        let mut send = DualVector::zeros(Arc::clone(subdomain.layout()));
        let mut recv = DualVector::zeros(Arc::clone(subdomain.layout()));
        subdomain.exchange(&mut sum, &mut send, &mut recv);

        let mut scaling = Self::multiplicity(subdomain);
        let blocks = subdomain.layout().blocks();
        for (neighbor, block) in subdomain.neighbors().iter().zip(blocks) {
            for (j, &idx) in neighbor.indices.iter().enumerate() {
                let pos = block.offset + j;
                if !sum[idx].is_zero() {
                    scaling.weights[pos] = (recv.as_slice()[pos] / sum[idx]).re();
                }
            }
        }
        scaling
    }

    /// One weight per dual unknown.
    pub fn weights(&self) -> &[R] {
        &self.weights
    }

    /// Weights spread back onto interface DOFs; the last neighbor referencing a DOF
    /// wins and unreferenced DOFs get 1.
    pub fn per_dof<C>(&self, subdomain: &Subdomain<C>) -> Vec<R> {
        let mut out = vec![R::one(); subdomain.dof()];
        let blocks = subdomain.layout().blocks();
        for (neighbor, block) in subdomain.neighbors().iter().zip(blocks) {
            for (j, &idx) in neighbor.indices.iter().enumerate() {
                out[idx] = self.weights[block.offset + j];
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};
    use crate::subdomain::Neighbor;
    use approx::assert_abs_diff_eq;
    use std::thread;

    #[test]
    fn multiplicity_of_a_corner_shared_by_three() {
        // DOF 0 is shared with ranks 1 and 2, DOF 1 only with rank 1.
        let sub = Subdomain::new(SerialComm, 2, vec![Neighbor::new(1, vec![0, 1]), Neighbor::new(2, vec![0])]);
        let s = Scaling::<f64>::multiplicity(&sub);
        assert_eq!(s.len(), 3);
        assert_abs_diff_eq!(s.weights()[0], 1.0 / 3.0);
        assert_abs_diff_eq!(s.weights()[1], 0.5);
        assert_abs_diff_eq!(s.weights()[2], 1.0 / 3.0);
        assert_eq!(s.per_dof(&sub), vec![1.0 / 3.0, 0.5]);
    }

    #[test]
    fn coefficient_weights_are_neighbor_ratios() {
        let comms = ThreadComm::universe(2);
        let weights: Vec<Vec<f64>> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let sub = Subdomain::new(comm, 2, vec![Neighbor::new(1 - rank, vec![0, 1])]);
                        let rho = if rank == 0 { vec![1.0, 0.0] } else { vec![3.0, 0.0] };
                        Scaling::from_coefficient(&sub, &rho).weights().to_vec()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_abs_diff_eq!(weights[0][0], 0.75);
        assert_abs_diff_eq!(weights[1][0], 0.25);
        // zero coefficient on both sides keeps the multiplicity weight
        assert_abs_diff_eq!(weights[0][1], 0.5);
        assert_abs_diff_eq!(weights[1][1], 0.5);
    }
}
