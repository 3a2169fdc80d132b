//! Derivative-free bounded minimization.
//!
//! All fitting in this crate goes through [`cmaes::minimize`], a bounded
//! CMA-ES with clamp repair. Convergence is judged by a per-component
//! point-delta checker ([`convergence::PointChecker`]) rather than a
//! fitness tolerance, so flat cost plateaus still terminate.

pub mod cmaes;
pub mod convergence;

pub use cmaes::{minimize, CmaesOptions, OptimOutcome};
pub use convergence::PointChecker;
