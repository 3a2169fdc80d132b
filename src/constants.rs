//! Numeric constants shared across the fitting and measurement pipeline.

/// Pseudo-Huber transition width for envelope and curve residuals.
pub const HUBER_DELTA: f64 = 0.5;

/// Cost assigned to candidate parameters that violate admissibility.
pub const INVALID_COST: f64 = f64::MAX;

/// Sentinel stored in a distance-curve slot when no admissible fit exists.
pub const UNFITTABLE: f64 = -1.0;

/// Fraction of the fit penalized per unit of trimmed window length.
pub const DEFAULT_LENGTH_WEIGHT: f64 = 0.5;

/// Optimizer iterations at or past which a grid refinement kicks in.
pub const DEFAULT_ITERATION_CUTOFF: usize = 50;

/// Cells per axis in the Mw/stress refinement grid.
pub const MW_GRID_STEPS: usize = 100;

/// CMA-ES population for the two-parameter Mw/stress fit.
pub const MW_FIT_POPULATION: usize = 50;

/// Random-start restarts for the Mw/stress fit; best result is kept.
pub const MW_FIT_RESTARTS: u64 = 10;

/// CMA-ES population for envelope-shape and distance-curve fits.
pub const SHAPE_POPULATION: usize = 50;

/// CMA-ES population for spectral-ratio inversions.
pub const RATIO_POPULATION: usize = 100;

/// Ratio-inversion cost below which the search stops outright.
pub const RATIO_STOP_FITNESS: f64 = 1e-10;

pub const RATIO_PAIR_MAX_ITERATIONS: usize = 500;
pub const RATIO_JOINT_MAX_ITERATIONS: usize = 5_000;

/// Cost-surface resolution for ratio-inversion diagnostics.
pub const SURFACE_X_DIM: usize = 32;
pub const SURFACE_Y_DIM: usize = 32;

/// Shortest window, in samples, the automatic picker may select.
pub const MIN_AUTOPICK_WINDOW_SAMPLES: usize = 10;

/// Seconds searched past the predicted arrival for the envelope peak.
pub const PEAK_SEARCH_WINDOW_SEC: f64 = 30.0;

/// Moment conversion from dyne-cm to N-m.
pub const DYNE_CM_TO_NEWTON_M: f64 = 1e-7;

pub const MPA_TO_PA: f64 = 1e6;

/// log10(e), for converting natural attenuation decay to log10 amplitude.
pub const LOG10_OF_E: f64 = std::f64::consts::LOG10_E;

/// Offset in the energy magnitude relation Me = log10(E)/1.5 - 3.2.
pub const ME_OFFSET: f64 = 3.2;
