//! Shared-memory communicator where each thread plays one rank.
//!
//! [`ThreadComm::universe`] wires `n` endpoints together: one unbounded channel per
//! ordered pair of ranks (so point-to-point messages keep their per-pair order, as
//! in MPI) and a shared accumulator guarded by a barrier for all-reductions. Move
//! each endpoint into its own thread and run the same SPMD code on every rank.

use super::{Comm, NeighborBlock, NeighborExchange};
use std::any::Any;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

type Message = Box<dyn Any + Send>;

struct Shared {
    barrier: Barrier,
    accumulator: Mutex<Vec<f64>>,
}

/// One rank of an in-process universe.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// `outbox[dest]` sends to rank `dest`.
    outbox: Vec<Sender<Message>>,
    /// `inbox[src]` receives from rank `src`.
    inbox: Vec<Receiver<Message>>,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a universe needs at least one rank");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            accumulator: Mutex::new(Vec::new()),
        });
        // senders[src][dest], receivers[dest][src]
        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Message>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for (src, outbox) in senders.iter_mut().enumerate() {
            for inboxes in receivers.iter_mut() {
                let (tx, rx) = channel();
                outbox.push(tx);
                inboxes[src] = Some(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outbox, inbox))| ThreadComm {
                rank,
                size,
                outbox,
                inbox: inbox.into_iter().flatten().collect(),
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.shared.barrier.wait();
    }
    fn all_reduce_into(&self, buf: &mut [f64]) {
        {
            let mut acc = self
                .shared
                .accumulator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if acc.is_empty() {
                acc.resize(buf.len(), 0.0);
            }
            assert_eq!(acc.len(), buf.len(), "all_reduce_into: ranks disagree on the buffer length");
            for (a, &b) in acc.iter_mut().zip(buf.iter()) {
                *a += b;
            }
        }
        self.shared.barrier.wait();
        {
            let acc = self
                .shared
                .accumulator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            buf.copy_from_slice(&acc);
        }
        // Everyone has read the sum; the leader resets the accumulator for the next call.
        if self.shared.barrier.wait().is_leader() {
            self.shared
                .accumulator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
        self.shared.barrier.wait();
    }
}

impl<K: Copy + Send + 'static> NeighborExchange<K> for ThreadComm {
    fn exchange(&self, plan: &[NeighborBlock], send: &[K], recv: &mut [K]) {
        for block in plan {
            let payload: Vec<K> = send[block.range()].to_vec();
            self.outbox[block.rank]
                .send(Box::new(payload))
                .expect("ThreadComm: peer rank hung up");
        }
        for block in plan {
            let message = self.inbox[block.rank]
                .recv()
                .expect("ThreadComm: peer rank hung up");
            let payload = message
                .downcast::<Vec<K>>()
                .expect("ThreadComm: scalar type mismatch between neighbors");
            assert_eq!(payload.len(), block.len, "ThreadComm: interface size mismatch with rank {}", block.rank);
            recv[block.range()].copy_from_slice(&payload);
        }
    }
}
