//! Source parameter estimation: the MDAC spectral model, coda amplitude
//! measurement, radiated-energy integration, and the Mw/apparent-stress
//! fit that ties them together.

pub mod amplitude;
pub mod energy;
pub mod estimator;
pub mod model;

pub use amplitude::{measure_amplitudes, AmplitudeMeasurer};
pub use energy::integrate_energy;
pub use estimator::{measure_mws, BandWeighting, MomentStressEstimator};
pub use model::{
    log_m0_to_mw, mw_in_dyne, mw_to_log_m0, mw_to_m0, SourceSpectrumModel,
};
