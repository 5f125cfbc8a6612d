//! Runtime options for the FETI solver.
//!
//! This module provides [`FetiOptions`], which selects the preconditioner variant,
//! the partition-of-unity policy and the coarse-space parameters. Variants can be set
//! through the builder methods or parsed from strings (e.g. values read from a
//! command line or a configuration file).
//!
//! # Example
//!
//! ```rust
//! use feti::config::options::{FetiOptions, FetiPreconditioner, ScalingKind};
//! let opts = FetiOptions::default()
//!     .with_preconditioner("lumped".parse().unwrap())
//!     .with_scaling(ScalingKind::Stiffness);
//! assert_eq!(opts.preconditioner, FetiPreconditioner::Lumped);
//! ```

use crate::coarse::CoarseParams;
use crate::error::FetiError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Local action of the FETI preconditioner `Q = B D⁻¹ S̃ D⁻¹ Bᵀ`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum FetiPreconditioner {
    /// Full Schur complement `S = A_bb − A_bi A_ii⁻¹ A_ib`.
    #[default]
    Dirichlet,
    /// Interface block `A_bb`.
    Lumped,
    /// Diagonal of the interface block.
    Superlumped,
    /// Identity.
    None,
}

impl FromStr for FetiPreconditioner {
    type Err = FetiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dirichlet" => Ok(Self::Dirichlet),
            "lumped" => Ok(Self::Lumped),
            "superlumped" => Ok(Self::Superlumped),
            "none" => Ok(Self::None),
            _ => Err(FetiError::Unsupported("unknown FETI preconditioner")),
        }
    }
}

impl fmt::Display for FetiPreconditioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dirichlet => "dirichlet",
            Self::Lumped => "lumped",
            Self::Superlumped => "superlumped",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// How partition-of-unity weights are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum ScalingKind {
    /// `1 / (1 + number of references)`.
    #[default]
    Multiplicity,
    /// Ratio of the diagonal of `A_bb` across the interface.
    Stiffness,
    /// Ratio of a user coefficient across the interface.
    Coefficient,
}

impl FromStr for ScalingKind {
    type Err = FetiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multiplicity" => Ok(Self::Multiplicity),
            "stiffness" => Ok(Self::Stiffness),
            "coefficient" | "rho" => Ok(Self::Coefficient),
            _ => Err(FetiError::Unsupported("unknown scaling policy")),
        }
    }
}

/// Solver-level configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FetiOptions {
    pub preconditioner: FetiPreconditioner,
    pub scaling: ScalingKind,
    pub coarse: CoarseParams,
}

impl FetiOptions {
    pub fn with_preconditioner(mut self, preconditioner: FetiPreconditioner) -> Self {
        self.preconditioner = preconditioner;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingKind) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_coarse(mut self, coarse: CoarseParams) -> Self {
        self.coarse = coarse;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_variants() {
        assert_eq!("Dirichlet".parse::<FetiPreconditioner>().unwrap(), FetiPreconditioner::Dirichlet);
        assert_eq!(" superlumped ".parse::<FetiPreconditioner>().unwrap(), FetiPreconditioner::Superlumped);
        assert_eq!("none".parse::<FetiPreconditioner>().unwrap(), FetiPreconditioner::None);
        assert!("jacobi".parse::<FetiPreconditioner>().is_err());
        assert_eq!("rho".parse::<ScalingKind>().unwrap(), ScalingKind::Coefficient);
        assert!(matches!("diag".parse::<ScalingKind>(), Err(FetiError::Unsupported(_))));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for p in [
            FetiPreconditioner::Dirichlet,
            FetiPreconditioner::Lumped,
            FetiPreconditioner::Superlumped,
            FetiPreconditioner::None,
        ] {
            assert_eq!(p.to_string().parse::<FetiPreconditioner>().unwrap(), p);
        }
    }

    #[test]
    fn defaults() {
        let opts = FetiOptions::default();
        assert_eq!(opts.preconditioner, FetiPreconditioner::Dirichlet);
        assert_eq!(opts.scaling, ScalingKind::Multiplicity);
        assert_eq!(opts.coarse.nu, 0);
    }
}
