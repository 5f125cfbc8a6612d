//! feti: FETI domain-decomposition primitives over Faer
//!
//! This crate provides the building blocks of the FETI (Finite Element Tearing and
//! Interconnecting) method: the distributed jump operator, partition-of-unity scaling,
//! local Dirichlet/lumped preconditioners, coarse-space projections with an optional
//! adaptive (GenEO) coarse space, and a projected conjugate gradient driver. Ranks
//! communicate through a small trait layer with in-process (threads) and MPI backends.

pub mod parallel;

pub mod coarse;
pub mod config;
pub mod core;
pub mod error;
pub mod feti;
pub mod matrix;
pub mod schur;
pub mod solver;
pub mod subdomain;
pub mod utils;

// Re-exports for convenience
pub use coarse::{CoarseOperator, CoarseParams, DenseCoarseOperator, DenseGeneo, EigenSolver};
pub use config::*;
pub use core::*;
pub use error::*;
pub use feti::{CoarseOnlyRank, Feti, FetiRank, ProjectionDirection, RankRole};
pub use matrix::*;
pub use parallel::{Comm, NeighborExchange, SerialComm, ThreadComm};
pub use schur::{DenseLu, LocalSolver, Schur};
pub use solver::*;
pub use subdomain::{DualVector, Neighbor, Subdomain};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
