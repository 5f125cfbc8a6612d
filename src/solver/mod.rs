//! Krylov drivers over the FETI primitives.

pub mod ppcg;
pub use ppcg::ProjectedCg;
