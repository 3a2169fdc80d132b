//! Configuration for calibration, measurement, and inversion.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ITERATION_CUTOFF, DEFAULT_LENGTH_WEIGHT};
use crate::types::FrequencyBand;

/// Box constraints and regularization weights for envelope and
/// curve fitting.
///
/// The `*_p1`/`*_p2`/`*_p3` bounds apply to the three parameters of the
/// hyperbolic distance curve `f(d) = p0 - p1 / (p2 + d)`; the `y*` and
/// `*_dist` bounds clip the observed term values and distances admitted
/// into each fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeConstraints {
    pub max_vp1: f64,
    pub min_vp1: f64,
    /// Regularization weight on the velocity curve's p1 term (default: 100).
    pub v0_reg: f64,
    pub max_vp2: f64,
    pub min_vp2: f64,
    pub max_vp3: f64,
    pub min_vp3: f64,

    pub max_bp1: f64,
    pub min_bp1: f64,
    /// Regularization weight on the beta curve's p1 term (default: 10,000).
    pub b0_reg: f64,
    pub max_bp2: f64,
    pub min_bp2: f64,
    pub max_bp3: f64,
    pub min_bp3: f64,

    pub max_gp1: f64,
    pub min_gp1: f64,
    /// Regularization weight on the gamma curve's p1 term (default: 100).
    pub g0_reg: f64,
    pub max_gp2: f64,
    pub min_gp2: f64,
    /// Sign flip applied to the gamma curve's p1 inside the model (default: -1).
    pub g1_reg: f64,
    pub max_gp3: f64,
    pub min_gp3: f64,

    /// Admissible velocity term values (km/s).
    pub yvv_min: f64,
    pub yvv_max: f64,
    pub v_dist_max: f64,
    pub v_dist_min: f64,

    /// Admissible beta term values.
    pub ybb_min: f64,
    pub ybb_max: f64,
    pub b_dist_max: f64,
    pub b_dist_min: f64,

    /// Admissible gamma term values.
    pub ygg_min: f64,
    pub ygg_max: f64,
    /// Distance below which the gamma fit is restricted (default: 600 km).
    pub g_dist_min: f64,
    /// Lower distance cutoff for the gamma fit (default: 0 km).
    pub g_dist_max: f64,

    /// Bounds on the per-envelope intercept, beta, and gamma parameters.
    pub min_intercept: f64,
    pub max_intercept: f64,
    pub min_beta: f64,
    pub max_beta: f64,
    pub min_gamma: f64,
    pub max_gamma: f64,

    /// Restarts for the per-envelope grid/refinement loop (default: 10).
    pub iterations: usize,
    /// Optimizer evaluation budget for per-envelope fits (default: 10,000).
    pub fitting_point_count: usize,
    /// Relative weight of the length residual in the joint end-time fit
    /// (default: 0.5).
    pub length_weight: f64,
}

impl Default for ShapeConstraints {
    fn default() -> Self {
        Self {
            max_vp1: 600.0,
            min_vp1: 50.0,
            v0_reg: 100.0,
            max_vp2: 5000.0,
            min_vp2: 1.0,
            max_vp3: 5000.0,
            min_vp3: 1.0,
            max_bp1: 1000.0,
            min_bp1: -500.0,
            b0_reg: 10000.0,
            max_bp2: 20.0,
            min_bp2: 0.1,
            max_bp3: 1500.0,
            min_bp3: 0.0001,
            max_gp1: 100.0,
            min_gp1: 0.0,
            g0_reg: 100.0,
            max_gp2: 101.0,
            min_gp2: 0.0,
            g1_reg: -1.0,
            max_gp3: 101.0,
            min_gp3: 1.0,
            yvv_min: 0.5,
            yvv_max: 6.01,
            v_dist_max: 1600.0,
            v_dist_min: 0.0,
            ybb_min: -12.0e-2,
            ybb_max: 0.0005,
            b_dist_max: 1550.0,
            b_dist_min: 0.0,
            ygg_min: 0.01,
            ygg_max: 100.0,
            g_dist_min: 600.0,
            g_dist_max: 0.0,
            min_intercept: 0.001,
            max_intercept: 20.0,
            min_beta: -4.0,
            max_beta: -0.0001,
            min_gamma: 0.001,
            max_gamma: 4.0,
            iterations: 10,
            fitting_point_count: 10_000,
            length_weight: DEFAULT_LENGTH_WEIGHT,
        }
    }
}

/// Three-parameter hyperbolic curve `f(d) = p0 - p1 / (p2 + d)`.
///
/// `p1 == -1.0` marks a curve the calibration could not fit; callers treat
/// the term as unusable for that band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceCurveParams {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
}

impl DistanceCurveParams {
    pub fn evaluate(&self, distance_km: f64) -> f64 {
        self.p0 - self.p1 / (self.p2 + distance_km)
    }

    /// True when the calibration marked this curve unfittable.
    pub fn is_unfittable(&self) -> bool {
        self.p1 == crate::constants::UNFITTABLE
    }
}

/// Calibrated per-band parameters shared by every station in a calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedBandParameters {
    pub band: FrequencyBand,
    /// Group velocity term v(d), km/s.
    pub velocity: DistanceCurveParams,
    /// Linear decay term b(d).
    pub beta: DistanceCurveParams,
    /// Log-time decay term g(d).
    pub gamma: DistanceCurveParams,
    /// Street-Herrmann spreading slopes: `s1` applies below `xc/xt`,
    /// `s2` beyond `xc*xt`, with a log-linear blend between.
    pub s1: f64,
    pub s2: f64,
    /// Street-Herrmann critical distance (km).
    pub xc: f64,
    /// Street-Herrmann transition distance (km).
    pub xt: f64,
    /// Coda Q for the band's path correction.
    pub q: f64,
    /// Shortest admissible coda window (s).
    pub min_length_sec: f64,
    /// Longest admissible coda window (s).
    pub max_length_sec: f64,
    /// Offset into the coda at which amplitude is measured (s).
    pub measurement_time_sec: f64,
}

/// Frequency-independent MDAC source and receiver parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MdacFi {
    /// Apparent stress at the reference moment (MPa).
    pub sigma: f64,
    /// Apparent-stress scaling exponent.
    pub psi: f64,
    /// P-to-S corner frequency ratio.
    pub zeta: f64,
    /// Reference moment for the sigma/psi scaling (N-m).
    pub m0_ref: f64,
    /// Source-region P velocity (m/s).
    pub alpha_s: f64,
    /// Source-region S velocity (m/s).
    pub beta_s: f64,
    /// Source-region density (kg/m^3).
    pub rho_s: f64,
    pub rad_pat_p: f64,
    pub rad_pat_s: f64,
    /// Receiver-region P velocity (m/s).
    pub alpha_r: f64,
    /// Receiver-region S velocity (m/s).
    pub beta_r: f64,
    /// Receiver-region density (kg/m^3).
    pub rho_r: f64,
}

impl Default for MdacFi {
    fn default() -> Self {
        Self {
            sigma: 0.3,
            psi: 0.0,
            zeta: 1.4142,
            m0_ref: 1.0e15,
            alpha_s: 5500.0,
            beta_s: 3500.0,
            rho_s: 2500.0,
            rad_pat_p: 0.44,
            rad_pat_s: 0.60,
            alpha_r: 5500.0,
            beta_r: 3500.0,
            rho_r: 2500.0,
        }
    }
}

/// Phase-specific MDAC attenuation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdacPs {
    pub phase: String,
    pub q0: f64,
    pub del_q0: f64,
    pub gamma0: f64,
    pub del_gamma0: f64,
    /// Phase group velocity (km/s).
    pub u0: f64,
    pub eta: f64,
    pub del_eta: f64,
    /// Critical distance (m) where spreading switches from 1/r to the
    /// eta power law.
    pub dist_crit: f64,
}

impl Default for MdacPs {
    fn default() -> Self {
        Self {
            phase: "Lg".to_string(),
            q0: 210.0,
            del_q0: 0.0,
            gamma0: 0.63,
            del_gamma0: 0.0,
            u0: 3.5,
            eta: 0.0,
            del_eta: 0.0,
            dist_crit: 0.001,
        }
    }
}

/// Tuning for per-event Mw/stress estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Grid-refinement passes before the restart loop gives up (default: 50).
    pub iteration_cutoff: usize,
    pub min_mw: f64,
    pub max_mw: f64,
    /// Apparent-stress search bounds (MPa).
    pub min_apparent_stress_mpa: f64,
    pub max_apparent_stress_mpa: f64,
    /// Report 1-sigma/2-sigma bounds for apparent stress as well as Mw
    /// (default: false).
    pub report_stress_bounds: bool,
    /// 2-sigma Mw spread above which an estimate is flagged poorly
    /// constrained (default: 0.5).
    pub poorly_constrained_mw_spread: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            iteration_cutoff: DEFAULT_ITERATION_CUTOFF,
            min_mw: 0.01,
            max_mw: 10.0,
            min_apparent_stress_mpa: 0.01,
            max_apparent_stress_mpa: 10.0,
            report_stress_bounds: false,
            poorly_constrained_mw_spread: 0.5,
        }
    }
}

/// Tuning for pairwise and joint spectral-ratio inversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioInversionConfig {
    /// Half-width of the log10(M0) prior window around a supplied Mw
    /// estimate (default: 0.001). The ratio cost is flat along a common
    /// moment shift, so a supplied prior has to pin the moments tightly.
    pub moment_error_range: f64,
    /// log10(M0) search bounds used when no prior estimate exists (N-m).
    pub min_log_moment: f64,
    pub max_log_moment: f64,
    /// Apparent-stress search bounds (MPa).
    pub min_apparent_stress_mpa: f64,
    pub max_apparent_stress_mpa: f64,
}

impl Default for RatioInversionConfig {
    fn default() -> Self {
        Self {
            moment_error_range: 0.001,
            min_log_moment: 1.0,
            max_log_moment: 25.0,
            min_apparent_stress_mpa: 0.001,
            max_apparent_stress_mpa: 100.0,
        }
    }
}

/// Tuning for raw coda amplitude measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurerConfig {
    /// Phase velocity used in the Q path term (km/s).
    pub phase_velocity_km_s: f64,
}

impl Default for MeasurerConfig {
    fn default() -> Self {
        Self { phase_velocity_km_s: 3.5 }
    }
}
