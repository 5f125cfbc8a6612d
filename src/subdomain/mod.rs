//! Subdomain topology: neighbor list, interface maps and dual-vector layout.
//!
//! A subdomain owns `dof` interface unknowns numbered `0..dof`. Each neighbor is
//! paired with an ordered list of interface indices; entry `j` of that list and
//! entry `j` of the neighbor's list for this rank refer to the same physical DOF.
//!
//! Dual vectors (one Lagrange multiplier per neighbor and shared DOF) are stored as
//! one owned buffer, with one `(offset, length)` block per neighbor in neighbor order.

use crate::core::traits::Scalar;
use crate::parallel::{Comm, NeighborBlock, NeighborExchange};
use std::sync::Arc;

/// A neighboring subdomain and the interface DOFs shared with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub rank: usize,
    pub indices: Vec<usize>,
}

impl Neighbor {
    pub fn new(rank: usize, indices: Vec<usize>) -> Self {
        Self { rank, indices }
    }
}

/// Per-neighbor blocks of a dual vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DualLayout {
    blocks: Vec<NeighborBlock>,
    mult: usize,
}

impl DualLayout {
    fn from_neighbors(neighbors: &[Neighbor]) -> Self {
        let mut offset = 0;
        let blocks = neighbors
            .iter()
            .map(|n| {
                let block = NeighborBlock { rank: n.rank, offset, len: n.indices.len() };
                offset += n.indices.len();
                block
            })
            .collect();
        Self { blocks, mult: offset }
    }

    /// Total number of local dual unknowns.
    pub fn mult(&self) -> usize {
        self.mult
    }

    pub fn blocks(&self) -> &[NeighborBlock] {
        &self.blocks
    }
}

/// Lagrange multipliers of one subdomain, contiguous across neighbors.
#[derive(Clone, Debug, PartialEq)]
pub struct DualVector<K> {
    data: Vec<K>,
    layout: Arc<DualLayout>,
}

impl<K: Scalar> DualVector<K> {
    pub fn zeros(layout: Arc<DualLayout>) -> Self {
        Self { data: vec![K::zero(); layout.mult()], layout }
    }

    /// Wrap existing values; `data.len()` must equal `layout.mult()`.
    pub fn from_vec(layout: Arc<DualLayout>, data: Vec<K>) -> Self {
        assert_eq!(data.len(), layout.mult(), "dual vector length does not match its layout");
        Self { data, layout }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn layout(&self) -> &Arc<DualLayout> {
        &self.layout
    }

    pub fn as_slice(&self) -> &[K] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [K] {
        &mut self.data
    }

    /// Values exchanged with the `i`-th neighbor.
    pub fn block(&self, i: usize) -> &[K] {
        &self.data[self.layout.blocks[i].range()]
    }

    pub fn block_mut(&mut self, i: usize) -> &mut [K] {
        let range = self.layout.blocks[i].range();
        &mut self.data[range]
    }

    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = K::zero());
    }

    pub fn copy_from(&mut self, other: &DualVector<K>) {
        self.data.copy_from_slice(&other.data);
    }
}

impl<K> AsRef<[K]> for DualVector<K> {
    fn as_ref(&self) -> &[K] {
        &self.data
    }
}

impl<K> AsMut<[K]> for DualVector<K> {
    fn as_mut(&mut self) -> &mut [K] {
        &mut self.data
    }
}

/// One process's partition of the global degrees of freedom, seen from its interface.
pub struct Subdomain<C> {
    comm: C,
    dof: usize,
    neighbors: Vec<Neighbor>,
    signed: usize,
    layout: Arc<DualLayout>,
}

impl<C: Comm> Subdomain<C> {
    /// Neighbors are sorted by rank; the ones with a lower rank than `comm.rank()`
    /// form the owning side of the jump operator.
    pub fn new(comm: C, dof: usize, mut neighbors: Vec<Neighbor>) -> Self {
        neighbors.sort_by_key(|n| n.rank);
        let me = comm.rank();
        debug_assert!(neighbors.iter().all(|n| n.rank != me), "a subdomain cannot neighbor itself");
        debug_assert!(
            neighbors.windows(2).all(|w| w[0].rank != w[1].rank),
            "duplicate neighbor rank"
        );
        debug_assert!(
            neighbors.iter().all(|n| n.indices.iter().all(|&i| i < dof)),
            "interface index out of range"
        );
        let signed = neighbors.partition_point(|n| n.rank < me);
        let layout = Arc::new(DualLayout::from_neighbors(&neighbors));
        Self { comm, dof, neighbors, signed, layout }
    }

    /// An interface-less partition, e.g. a coarse-only rank.
    pub fn isolated(comm: C) -> Self {
        Self::new(comm, 0, Vec::new())
    }
}

impl<C> Subdomain<C> {
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Number of interface unknowns.
    pub fn dof(&self) -> usize {
        self.dof
    }

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// Neighbors `0..signed` contribute with a negative sign to the jump operator.
    pub fn signed(&self) -> usize {
        self.signed
    }

    pub fn mult(&self) -> usize {
        self.layout.mult()
    }

    pub fn layout(&self) -> &Arc<DualLayout> {
        &self.layout
    }

    /// Number of (neighbor, index) references to each interface DOF.
    pub fn multiplicity(&self) -> Vec<usize> {
        let mut count = vec![0usize; self.dof];
        for neighbor in &self.neighbors {
            for &i in &neighbor.indices {
                count[i] += 1;
            }
        }
        count
    }

    /// Gather the interface values of `u` into per-neighbor blocks of `out`.
    pub fn gather<K: Scalar>(&self, u: &[K], out: &mut DualVector<K>) {
        for (i, neighbor) in self.neighbors.iter().enumerate() {
            for (o, &idx) in out.block_mut(i).iter_mut().zip(&neighbor.indices) {
                *o = u[idx];
            }
        }
    }

    /// Sum interface values across every subdomain sharing them.
    ///
    /// After the call `u[idx]` holds the sum over all sharing subdomains and
    /// `recv.block(i)` holds the values received from neighbor `i`.
    pub fn exchange<K: Scalar>(&self, u: &mut [K], send: &mut DualVector<K>, recv: &mut DualVector<K>)
    where
        C: NeighborExchange<K>,
    {
        debug_assert_eq!(u.len(), self.dof);
        self.gather(u, send);
        self.comm
            .exchange(self.layout.blocks(), send.as_slice(), recv.as_mut_slice());
        for (i, neighbor) in self.neighbors.iter().enumerate() {
            for (&r, &idx) in recv.block(i).iter().zip(&neighbor.indices) {
                u[idx] += r;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};
    use std::thread;

    #[test]
    fn layout_concatenates_neighbor_blocks_in_rank_order() {
        let comms = ThreadComm::universe(4);
        let comm = comms.into_iter().nth(2).unwrap();
        let sub = Subdomain::new(
            comm,
            5,
            vec![Neighbor::new(3, vec![4, 1]), Neighbor::new(0, vec![0]), Neighbor::new(1, vec![1, 2, 3])],
        );
        let ranks: Vec<usize> = sub.neighbors().iter().map(|n| n.rank).collect();
        assert_eq!(ranks, vec![0, 1, 3]);
        assert_eq!(sub.signed(), 2);
        assert_eq!(sub.mult(), 6);
        let offsets: Vec<usize> = sub.layout().blocks().iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 1, 4]);
        assert_eq!(sub.multiplicity(), vec![1, 2, 1, 1, 1]);
    }

    #[test]
    fn dual_vector_blocks_are_views() {
        let sub = Subdomain::new(SerialComm, 0, Vec::new());
        let v = DualVector::<f64>::zeros(Arc::clone(sub.layout()));
        assert!(v.is_empty());
        let layout = Arc::new(DualLayout::from_neighbors(&[
            Neighbor::new(1, vec![0, 1]),
            Neighbor::new(2, vec![2]),
        ]));
        let mut v = DualVector::from_vec(layout, vec![1.0, 2.0, 3.0]);
        v.block_mut(1)[0] = 7.0;
        assert_eq!(v.block(0), &[1.0, 2.0]);
        assert_eq!(v.as_slice(), &[1.0, 2.0, 7.0]);
    }

    #[test]
    fn exchange_accumulates_shared_values() {
        let comms = ThreadComm::universe(2);
        let results: Vec<(Vec<f64>, Vec<f64>)> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        // rank 0 shares its DOFs [1, 2] with rank 1's DOFs [0, 1]
                        let indices = if rank == 0 { vec![1, 2] } else { vec![0, 1] };
                        let sub = Subdomain::new(comm, 3, vec![Neighbor::new(1 - rank, indices)]);
                        let mut u = if rank == 0 { vec![1.0, 2.0, 3.0] } else { vec![10.0, 20.0, 30.0] };
                        let mut send = DualVector::zeros(Arc::clone(sub.layout()));
                        let mut recv = DualVector::zeros(Arc::clone(sub.layout()));
                        sub.exchange(&mut u, &mut send, &mut recv);
                        (u, recv.as_slice().to_vec())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0].0, vec![1.0, 12.0, 23.0]);
        assert_eq!(results[0].1, vec![10.0, 20.0]);
        assert_eq!(results[1].0, vec![12.0, 23.0, 30.0]);
        assert_eq!(results[1].1, vec![2.0, 3.0]);
    }
}
