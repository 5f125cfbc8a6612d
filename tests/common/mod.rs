//! Helpers shared by the integration tests: a thread-per-rank runner and small
//! finite-element systems split across subdomains.

#![allow(dead_code)]

use faer::linalg::solvers::SolveCore;
use feti::coarse::DenseCoarseOperator;
use feti::matrix::CsrMatrix;
use feti::parallel::{Comm, ThreadComm};
use feti::schur::{DenseLu, Schur};
use feti::subdomain::{Neighbor, Subdomain};
use feti::{Feti, FetiOptions};
use std::thread;

pub type ThreadFeti = Feti<f64, ThreadComm, DenseLu, DenseCoarseOperator>;

/// Run `body` once per rank of an in-process universe of `size` ranks and collect
/// the results in rank order.
pub fn run_ranks<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let comms = ThreadComm::universe(size);
    let body = &body;
    thread::scope(|s| {
        let handles: Vec<_> = comms.into_iter().map(|comm| s.spawn(move || body(comm))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Two unit squares sharing one edge. Each rank holds the 9 nodes of its square,
/// the 6 nodes off the shared edge first and the 3 edge nodes last, with an identity
/// local matrix.
pub fn unit_square_pair(comm: ThreadComm, options: FetiOptions) -> ThreadFeti {
    let other = 1 - comm.rank();
    let subdomain = Subdomain::new(comm, 3, vec![Neighbor::new(other, vec![0, 1, 2])]);
    let schur = Schur::new(CsrMatrix::identity(9), 6).unwrap();
    Feti::new(subdomain, schur, options).unwrap()
}

/// Linear elements on a line: stiffness `[[1, -1], [-1, 1]]` plus a lumped reaction
/// term `sigma / 2` at each end, and a load `q / 2` per end.
///
/// With `sigma = 0` the problem is pure diffusion and subdomains touching no
/// anchor float.
pub struct Chain {
    pub sigma: f64,
    /// `(left node, right node, q)` for each element, global node numbers.
    pub elements: Vec<(usize, usize, f64)>,
    /// `(node, k)`: a spring of stiffness `k` tying the node to zero.
    pub anchors: Vec<(usize, f64)>,
}

impl Chain {
    pub fn new(nodes: usize, sigma: f64) -> Self {
        let elements = (0..nodes - 1)
            .map(|e| (e, e + 1, 1.0 + 0.5 * (e as f64).sin()))
            .collect();
        Self { sigma, elements, anchors: Vec::new() }
    }

    pub fn anchored(mut self, node: usize, k: f64) -> Self {
        self.anchors.push((node, k));
        self
    }

    pub fn nodes(&self) -> usize {
        self.elements.len() + 1
    }

    /// Assemble the elements `elems` on the local numbering `order` (global ids).
    pub fn assemble(&self, order: &[usize], elems: &[usize]) -> (CsrMatrix<f64>, Vec<f64>) {
        let local = |g: usize| order.iter().position(|&o| o == g).unwrap();
        let mut triplets = Vec::new();
        let mut f = vec![0.0; order.len()];
        for &e in elems {
            let (a, b, q) = self.elements[e];
            let (i, j) = (local(a), local(b));
            triplets.push((i, i, 1.0 + 0.5 * self.sigma));
            triplets.push((j, j, 1.0 + 0.5 * self.sigma));
            triplets.push((i, j, -1.0));
            triplets.push((j, i, -1.0));
            f[i] += 0.5 * q;
            f[j] += 0.5 * q;
        }
        for &(g, k) in &self.anchors {
            if let Some(i) = order.iter().position(|&o| o == g) {
                triplets.push((i, i, k));
            }
        }
        (CsrMatrix::from_triplets(order.len(), order.len(), &triplets), f)
    }

    /// Solution of the undivided problem.
    pub fn global_solution(&self) -> Vec<f64> {
        let n = self.nodes();
        let order: Vec<usize> = (0..n).collect();
        let elems: Vec<usize> = (0..self.elements.len()).collect();
        let (a, mut f) = self.assemble(&order, &elems);
        let lu = faer::linalg::solvers::FullPivLu::new(a.to_dense().as_ref());
        let x = faer::MatMut::from_column_major_slice_mut(&mut f, n, 1);
        lu.solve_in_place_with_conj(faer::Conj::No, x);
        f
    }
}
