//! Coda envelope shape calibration.
//!
//! [`envelope`] fits the per-waveform decay model
//! `intercept - gamma*log10(t) + beta*t`; [`distance`] fits the calibrated
//! velocity/beta/gamma terms as hyperbolic functions of epicentral
//! distance, with an exhaustive grid fallback when the evolutionary fit
//! fails or lands on a physically inadmissible curve.

pub mod distance;
pub mod envelope;

pub use distance::{
    fit_all_beta, fit_all_gamma, fit_all_velocity, fit_distance_curve, CmaesCurveFitter,
    CurveKind, ExhaustiveCurveFitter, GridFitter,
};
pub use envelope::fit_envelope;

/// Pseudo-Huber point loss shared by every shape fit, delta 0.5.
///
/// Smooth near zero, linear in the tails, so a handful of glitched
/// envelope points cannot dominate a fit.
pub(crate) fn huber_loss(predicted: f64, actual: f64) -> f64 {
    let delta = crate::constants::HUBER_DELTA;
    delta * delta + (1.0 + ((predicted - actual).abs() / delta).powi(2)).sqrt() - 1.0
}

/// SplitMix64 mix of a base seed and a stream counter, so parallel restart
/// streams are decorrelated but fully reproducible.
pub(crate) fn counter_seed(base_seed: u64, counter: u64) -> u64 {
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}
