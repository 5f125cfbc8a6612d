/// MPI-based parallel communication module.
///
/// This module provides an implementation of the `Comm` and `NeighborExchange` traits using the MPI
/// (Message Passing Interface) backend for distributed-memory parallelism. Neighbor exchanges post
/// every non-blocking receive and send of a round before waiting on all of them, and all-reductions
/// run over the world communicator so that coarse-only ranks take part. The implementation is only
/// available when the `mpi` feature is enabled.
///
/// # References
/// - [MPI Standard](https://www.mpi-forum.org/)
///
/// # Example
/// ```no_run
/// # #[cfg(feature = "mpi")]
/// # {
/// use feti::parallel::{Comm, MpiComm};
/// let comm = MpiComm::new().expect("MPI already initialized");
/// println!("Rank: {} / {}", comm.rank(), comm.size());
/// comm.barrier();
/// # }
/// ```
use mpi::collective::SystemOperation;
use mpi::datatype::Equivalence;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{Comm, NeighborBlock, NeighborExchange};
use crate::error::FetiError;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI universe (finalized on drop), the world communicator, the rank of the current
/// process, and the total number of processes.
pub struct MpiComm {
    _universe: Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    pub fn new() -> Result<Self, FetiError> {
        let universe = mpi::initialize().ok_or_else(|| FetiError::Comm("MPI is already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { _universe: universe, world, rank, size })
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.world.barrier();
    }
    fn all_reduce_into(&self, buf: &mut [f64]) {
        let local = buf.to_vec();
        self.world.all_reduce_into(&local[..], buf, SystemOperation::sum());
    }
}

impl<K: Equivalence> NeighborExchange<K> for MpiComm {
    fn exchange(&self, plan: &[NeighborBlock], send: &[K], recv: &mut [K]) {
        mpi::request::scope(|scope| {
            let mut receives = Vec::with_capacity(plan.len());
            let mut sends = Vec::with_capacity(plan.len());
            // Blocks are laid out contiguously in neighbor order.
            let mut rest: &mut [K] = recv;
            for block in plan {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(block.len);
                rest = tail;
                let process = self.world.process_at_rank(block.rank as i32);
                receives.push(process.immediate_receive_into(scope, head));
            }
            for block in plan {
                let process = self.world.process_at_rank(block.rank as i32);
                sends.push(process.immediate_send(scope, &send[block.range()]));
            }
            for request in receives {
                request.wait();
            }
            for request in sends {
                request.wait();
            }
        });
    }
}
