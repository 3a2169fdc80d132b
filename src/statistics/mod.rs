//! Shared statistics primitives: streaming moments, misfit criteria, and
//! the binned cost surfaces produced by the inversions.

pub mod summary;
pub mod surface;

pub use summary::{cv_rmsd, linear_regression, median, weighted_cv_rmsd, RunningStats};
pub use surface::{CostSurface, SurfaceCell};
