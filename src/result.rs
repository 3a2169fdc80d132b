//! Result records produced by the fitting and inversion pipelines.

use serde::{Deserialize, Serialize};

use crate::statistics::CostSurface;
use crate::types::EventId;

/// Fitted decay parameters for a single coda envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeFit {
    pub intercept: f64,
    pub gamma: f64,
    pub beta: f64,
    /// Fitted coda end, seconds from the window start. Equals the full
    /// window length unless the fit auto-picked a shorter one.
    pub end_time_sec: f64,
    /// Final loss value; `f64::MAX` marks a fit that never evaluated a
    /// finite model.
    pub error: f64,
}

/// Amplitude measured from one observed/synthetic envelope pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplitudeMeasurement {
    pub waveform_id: i64,
    /// Median offset of the observed envelope above the synthetic, log10
    /// amplitude units.
    pub raw_amplitude: f64,
    /// Raw amplitude shifted along the synthetic shape to the band's
    /// measurement time.
    pub raw_at_measurement_time: f64,
    pub path_corrected: f64,
    /// Zero when the station has a non-positive site term.
    pub path_and_site_corrected: f64,
    /// Cut window actually measured, seconds relative to origin.
    pub start_cut_sec: f64,
    pub end_cut_sec: f64,
    /// CV(RMSD) between the observed envelope and the shifted synthetic.
    pub fit_residual: f64,
}

/// Radiated-energy summary attached to an [`MwEstimate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyInfo {
    /// Total radiated energy, J.
    pub obs_energy: f64,
    pub log_total_energy: f64,
    /// log10 of the energy the fitted MDAC model predicts.
    pub log_energy_mdac: f64,
    pub energy_ratio: f64,
    /// Apparent stress implied by the observed energy, MPa.
    pub obs_apparent_stress_mpa: f64,
    /// Energy magnitude.
    pub me: f64,
}

/// Best-fit source parameters for one event, with sampling-based
/// uncertainty bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MwEstimate {
    pub event_id: EventId,
    /// log10 seismic moment, dyne-cm.
    pub log_m0: f64,
    pub mw: f64,
    pub apparent_stress_mpa: f64,
    pub corner_frequency_hz: f64,
    /// Weighted CV(RMSD) at the best point.
    pub misfit: f64,

    pub mw_mean: f64,
    pub mw_sd: f64,
    pub stress_mean: f64,
    pub stress_sd: f64,
    pub misfit_mean: f64,
    pub misfit_sd: f64,
    pub corner_mean: f64,
    pub corner_sd: f64,

    pub mw_1_min: f64,
    pub mw_1_max: f64,
    pub mw_2_min: f64,
    pub mw_2_max: f64,
    pub stress_1_min: f64,
    pub stress_1_max: f64,
    pub stress_2_min: f64,
    pub stress_2_max: f64,
    pub corner_1_min: f64,
    pub corner_1_max: f64,
    pub corner_2_min: f64,
    pub corner_2_max: f64,
    pub energy_1_min: f64,
    pub energy_1_max: f64,
    pub energy_2_min: f64,
    pub energy_2_max: f64,

    /// Bands that contributed a positive mean amplitude.
    pub data_count: usize,
    /// Optimizer generations spent before any grid fallback.
    pub iterations: usize,
    pub likely_poorly_constrained: bool,
    pub energy: Option<EnergyInfo>,
}

/// Joint source parameters for an event pair from spectral-ratio
/// inversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPairEstimate {
    pub event_id_a: EventId,
    pub event_id_b: EventId,

    /// log10 seismic moment, N-m.
    pub moment_a: f64,
    pub apparent_stress_a_mpa: f64,
    pub corner_a_hz: f64,
    pub corner_a_1_min: f64,
    pub corner_a_1_max: f64,
    pub corner_a_2_min: f64,
    pub corner_a_2_max: f64,

    pub moment_b: f64,
    pub apparent_stress_b_mpa: f64,
    pub corner_b_hz: f64,
    pub corner_b_1_min: f64,
    pub corner_b_1_max: f64,
    pub corner_b_2_min: f64,
    pub corner_b_2_max: f64,

    /// Summed absolute ratio misfit at the best point.
    pub misfit: f64,

    /// Evaluations binned over (log10 M0_B, log10 M0_A).
    pub moment_surface: CostSurface,
    /// Evaluations binned over (log10 stress_B, log10 stress_A).
    pub stress_surface: CostSurface,

    /// Bounds the inversion actually searched, after prior narrowing:
    /// (moment_a, moment_b, stress) as (min, max) pairs.
    pub moment_bounds_a: (f64, f64),
    pub moment_bounds_b: (f64, f64),
    pub stress_bounds_mpa: (f64, f64),
}
