pub mod options;

pub use options::{FetiOptions, FetiPreconditioner, ScalingKind};
