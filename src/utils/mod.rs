//! Shared helpers for the solver drivers.

pub mod convergence;
