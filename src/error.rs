use thiserror::Error;

// Unified error type for feti

#[derive(Error, Debug)]
pub enum FetiError {
    #[error("factorization error: {0}")]
    Factorization(String),
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("indefinite interface operator detected (p^T F p <= 0)")]
    IndefiniteOperator,
    #[error("indefinite preconditioner detected (r^T z < 0)")]
    IndefinitePreconditioner,
    #[error("non-finite {0} in projected CG")]
    NonFinite(&'static str),
    #[error("generalized eigenproblem error: {0}")]
    Eigen(String),
    #[error("communication error: {0}")]
    Comm(String),
    #[error("no coarse operator has been built")]
    CoarseOperatorMissing,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl FetiError {
    /// Shorthand used by size checks at fallible entry points.
    pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(FetiError::DimensionMismatch { what, expected, found })
        }
    }
}
