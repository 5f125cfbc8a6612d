//! Communication backends.
//!
//! FETI needs exactly two kinds of communication: a one-round exchange with the
//! statically known neighbors of a subdomain, and sum all-reductions over every
//! rank (subdomain ranks and coarse-only ranks alike). [`Comm`] carries the
//! collectives, [`NeighborExchange`] the point-to-point round for one scalar type.
//!
//! Backends:
//! - [`SerialComm`]: a single rank without neighbors.
//! - [`ThreadComm`]: one thread per rank inside a process, used by the tests.
//! - `MpiComm` (feature `mpi`): distributed memory over MPI.

use std::ops::Range;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub mod thread_comm;
pub use thread_comm::ThreadComm;

/// Collective operations over the full solver communicator.
pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Sum of `x` over all ranks.
    fn all_reduce(&self, x: f64) -> f64 {
        let mut buf = [x];
        self.all_reduce_into(&mut buf);
        buf[0]
    }
    /// Elementwise sum of `buf` over all ranks, in place.
    fn all_reduce_into(&self, buf: &mut [f64]);
}

/// One contiguous block of a dual-layout buffer, owned by the exchange with `rank`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborBlock {
    pub rank: usize,
    pub offset: usize,
    pub len: usize,
}

impl NeighborBlock {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// One round of neighbor-to-neighbor messages.
///
/// For every block, `send[block.range()]` goes to `block.rank` and the message
/// coming back from `block.rank` lands in `recv[block.range()]`. All transfers are
/// posted before the single wait; per-pair message order is preserved across calls.
pub trait NeighborExchange<K> {
    fn exchange(&self, plan: &[NeighborBlock], send: &[K], recv: &mut [K]);
}

/// Single-rank communicator. Collectives are identities and there are no neighbors.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce_into(&self, _buf: &mut [f64]) {}
}

impl<K> NeighborExchange<K> for SerialComm {
    fn exchange(&self, plan: &[NeighborBlock], _send: &[K], _recv: &mut [K]) {
        assert!(plan.is_empty(), "SerialComm cannot exchange with neighbors");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_collectives_are_identity() {
        let comm = SerialComm;
        assert_eq!(comm.all_reduce(3.5), 3.5);
        let mut buf = [1.0, 2.0];
        comm.all_reduce_into(&mut buf);
        assert_eq!(buf, [1.0, 2.0]);
        let mut recv: [f64; 0] = [];
        comm.exchange(&[], &[] as &[f64], &mut recv);
    }

    #[test]
    fn block_range() {
        let b = NeighborBlock { rank: 3, offset: 4, len: 2 };
        assert_eq!(b.range(), 4..6);
    }
}
