//! Scalar abstraction and dense vector kernels.

pub mod traits;
pub mod wrappers;

pub use traits::Scalar;
