//! Matrix module: dense and sparse matrix types and traits.

pub mod dense;
pub use dense::DenseMatrix;
pub mod sparse;
pub use sparse::{CsrMatrix, SparseMatrix};
