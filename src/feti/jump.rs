//! Implicit signed jump operator `B`.
//!
//! `B` maps interface values to one Lagrange multiplier per (neighbor, shared DOF).
//! Neighbors `0..signed` (lower ranks) contribute with a minus sign, the others with
//! a plus sign, so for a pair of ranks `a < b` both sides hold `x_a − x_b`.
//!
//! - [`JumpOperator::reduce`] applies `Bᵀ` and never communicates.
//! - [`JumpOperator::expand`] applies `B` with exactly one neighbor exchange round.

use crate::core::traits::Scalar;
use crate::core::wrappers::axpy;
use crate::parallel::NeighborExchange;
use crate::subdomain::Subdomain;

/// View of a subdomain as a jump operator, optionally weighted by a partition of unity.
pub struct JumpOperator<'a, C, R> {
    subdomain: &'a Subdomain<C>,
    weights: Option<&'a [R]>,
}

impl<'a, C, R: Copy> JumpOperator<'a, C, R> {
    /// `weights`, when given, has one entry per dual unknown.
    pub fn new(subdomain: &'a Subdomain<C>, weights: Option<&'a [R]>) -> Self {
        debug_assert!(weights.is_none_or(|w| w.len() == subdomain.mult()));
        Self { subdomain, weights }
    }

    #[inline]
    fn weighted<K: Scalar<Real = R>>(&self, v: K, pos: usize) -> K {
        match self.weights {
            Some(w) => v.scale(w[pos]),
            None => v,
        }
    }

    /// primal ← Bᵀ dual
    pub fn reduce<K: Scalar<Real = R>>(&self, dual: &[K], primal: &mut [K]) {
        debug_assert_eq!(dual.len(), self.subdomain.mult());
        debug_assert_eq!(primal.len(), self.subdomain.dof());
        primal.iter_mut().for_each(|v| *v = K::zero());
        let signed = self.subdomain.signed();
        let blocks = self.subdomain.layout().blocks();
        for (i, (neighbor, block)) in self.subdomain.neighbors().iter().zip(blocks).enumerate() {
            for (j, &idx) in neighbor.indices.iter().enumerate() {
                let pos = block.offset + j;
                let v = self.weighted(dual[pos], pos);
                if i < signed {
                    primal[idx] -= v;
                } else {
                    primal[idx] += v;
                }
            }
        }
    }

    /// dual ← B primal. `recv` is a scratch buffer of the same length as `dual`.
    pub fn expand<K: Scalar<Real = R>>(&self, primal: &[K], dual: &mut [K], recv: &mut [K])
    where
        C: NeighborExchange<K>,
    {
        debug_assert_eq!(primal.len(), self.subdomain.dof());
        debug_assert_eq!(dual.len(), self.subdomain.mult());
        debug_assert_eq!(recv.len(), dual.len());
        let signed = self.subdomain.signed();
        let blocks = self.subdomain.layout().blocks();
        for (i, (neighbor, block)) in self.subdomain.neighbors().iter().zip(blocks).enumerate() {
            for (j, &idx) in neighbor.indices.iter().enumerate() {
                let pos = block.offset + j;
                let v = self.weighted(primal[idx], pos);
                dual[pos] = if i < signed { -v } else { v };
            }
        }
        self.subdomain.comm().exchange(blocks, dual, recv);
        // blocks are contiguous, one add covers every neighbor
        axpy(K::one(), recv, dual);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{Comm, SerialComm, ThreadComm};
    use crate::subdomain::Neighbor;
    use std::thread;

    #[test]
    fn reduce_signs_follow_rank_order() {
        // Rank 0 of a serial comm sees every neighbor as higher ranked.
        let sub = Subdomain::new(SerialComm, 3, vec![Neighbor::new(1, vec![0, 2]), Neighbor::new(2, vec![2])]);
        let jump = JumpOperator::<_, f64>::new(&sub, None);
        let mut primal = vec![9.0; 3];
        jump.reduce(&[1.0, 2.0, 3.0], &mut primal);
        assert_eq!(primal, vec![1.0, 0.0, 5.0]);
    }

    #[test]
    fn weighted_reduce() {
        let sub = Subdomain::new(SerialComm, 2, vec![Neighbor::new(1, vec![1, 0])]);
        let w = [0.5, 0.25];
        let jump = JumpOperator::new(&sub, Some(&w[..]));
        let mut primal = vec![0.0; 2];
        jump.reduce(&[4.0, 4.0], &mut primal);
        assert_eq!(primal, vec![1.0, 2.0]);
    }

    #[test]
    fn expand_then_reduce_gives_owner_minus_other() {
        // Two ranks share one edge of 2 DOFs: rank 0 DOFs [1, 2], rank 1 DOFs [0, 1].
        let comms = ThreadComm::universe(2);
        let results: Vec<(Vec<f64>, Vec<f64>)> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let indices = if rank == 0 { vec![1, 2] } else { vec![0, 1] };
                        let sub = Subdomain::new(comm, 3, vec![Neighbor::new(1 - rank, indices)]);
                        let x = if rank == 0 { vec![0.0, 5.0, 7.0] } else { vec![2.0, 3.0, 100.0] };
                        let jump = JumpOperator::<_, f64>::new(&sub, None);
                        let mut dual = vec![0.0; 2];
                        let mut recv = vec![0.0; 2];
                        jump.expand(&x, &mut dual, &mut recv);
                        let mut back = vec![0.0; 3];
                        jump.reduce(&dual, &mut back);
                        (dual, back)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        // x_0 − x_1 on both sides of the edge
        assert_eq!(results[0].0, vec![3.0, 4.0]);
        assert_eq!(results[1].0, vec![3.0, 4.0]);
        // Bᵀ: owner side adds, other side subtracts
        assert_eq!(results[0].1, vec![0.0, 3.0, 4.0]);
        assert_eq!(results[1].1, vec![-3.0, -4.0, 0.0]);
    }
}
