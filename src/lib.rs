//! # coda-spectra
//!
//! Estimate physical source parameters of seismic events from coda-wave
//! envelope measurements.
//!
//! Given calibrated coda envelopes this crate recovers:
//! - Moment magnitude (Mw) and apparent stress with 1-sigma/2-sigma bounds
//! - Corner frequency and radiated energy
//! - Empirical envelope decay shapes and their distance scaling
//! - Relative source parameters for event pairs via spectral-ratio
//!   inversion
//!
//! The physical backbone is the Walter-Taylor MDAC2 source model; fitting
//! runs on a bounded CMA-ES minimizer. The crate owns no I/O: callers feed
//! it envelope sample arrays, band parameter records, and MDAC constants,
//! and get plain result records back.
//!
//! ## Quick start
//!
//! ```ignore
//! use coda_spectra::{
//!     BandWeighting, EstimatorConfig, MdacFi, MomentStressEstimator, Phase,
//! };
//!
//! let estimator = MomentStressEstimator::new(
//!     EstimatorConfig::default(),
//!     MdacFi::default(),
//!     Phase::Lg,
//!     42,
//! );
//! let estimate = estimator
//!     .fit_mw("evid-1234", &band_summaries, BandWeighting::FavorLowFrequencies)
//!     .unwrap();
//! println!("Mw {:.2} @ {:.2} MPa", estimate.mw, estimate.apparent_stress_mpa);
//! ```

#![warn(clippy::all)]

// Core modules
mod constants;
pub mod config;
pub mod error;
mod result;
mod types;

// Functional modules
pub mod optimizer;
pub mod ratio;
pub mod shape;
pub mod source;
pub mod statistics;

// Re-exports for public API
pub use config::{
    DistanceCurveParams, EstimatorConfig, MdacFi, MdacPs, MeasurerConfig,
    RatioInversionConfig, ShapeConstraints, SharedBandParameters,
};
pub use error::MeasurementError;
pub use ratio::{invert_joint, MomentPriors, PairwiseRatioInverter, StationRatioData};
pub use result::{
    AmplitudeMeasurement, EnergyInfo, EnvelopeFit, EventPairEstimate, MwEstimate,
};
pub use shape::{fit_distance_curve, fit_envelope, CurveKind};
pub use source::{
    integrate_energy, measure_amplitudes, measure_mws, AmplitudeMeasurer, BandWeighting,
    MomentStressEstimator, SourceSpectrumModel,
};
pub use statistics::{CostSurface, SurfaceCell};
pub use types::{
    BandSummary, CodaWaveform, EnvelopeSeries, EventId, FrequencyBand, Phase, RatioDetail,
};
