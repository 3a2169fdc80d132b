//! Spectral-ratio inversion: recover relative source parameters for event
//! pairs from observed log amplitude-ratio measurements.
//!
//! The per-pair inverter fits (log10 M0, apparent stress) for both events
//! of a pair against the omega-squared ratio model; the joint inverter
//! shares each unique event's parameters across every pair it appears in.
//! Every cost evaluation is binned into moment and stress cost surfaces
//! and kept for the corner-frequency uncertainty scan.

pub mod joint;
pub mod pair;

pub use joint::invert_joint;
pub use pair::PairwiseRatioInverter;

use std::collections::BTreeMap;

use crate::result::EventPairEstimate;
use crate::source::SourceSpectrumModel;
use crate::statistics::{CostSurface, RunningStats};
use crate::types::{EventId, FrequencyBand, RatioDetail};

/// Ratio measurements for one event pair, keyed by station then band.
pub type StationRatioData = BTreeMap<String, BTreeMap<FrequencyBand, RatioDetail>>;

/// Prior Mw estimates (fit or reference) by event, used to narrow the
/// moment search bounds.
pub type MomentPriors = BTreeMap<EventId, f64>;

/// One recorded evaluation: total cost and implied corner frequencies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RatioSample {
    pub fit: f64,
    pub corner_a: f64,
    pub corner_b: f64,
}

/// Sum over all station/band records of the absolute misfit between the
/// observed ratio and the model ratio. Returns the cost and both implied
/// corner frequencies.
pub(crate) fn pair_cost(
    model: &SourceSpectrumModel,
    data: &StationRatioData,
    log_m0_a: f64,
    stress_a: f64,
    log_m0_b: f64,
    stress_b: f64,
) -> RatioSample {
    let corner_a = model.corner_freq_from_stress_m0(10f64.powf(log_m0_a), stress_a);
    let corner_b = model.corner_freq_from_stress_m0(10f64.powf(log_m0_b), stress_b);
    let mut sum = 0.0;
    for bands in data.values() {
        for (band, detail) in bands {
            let f = band.center_hz();
            let amp_a = log_m0_a - (1.0 + (f / corner_a).powi(2)).log10();
            let amp_b = log_m0_b - (1.0 + (f / corner_b).powi(2)).log10();
            sum += (detail.diff_avg - (amp_a - amp_b)).abs();
        }
    }
    RatioSample {
        fit: sum,
        corner_a,
        corner_b,
    }
}

/// Per-pair evaluation log: the two cost surfaces, the sample list for the
/// bound scan, and streaming fit statistics.
pub(crate) struct PairAccumulator {
    pub moment_surface: CostSurface,
    pub stress_surface: CostSurface,
    pub samples: Vec<RatioSample>,
    pub fit_stats: RunningStats,
}

impl PairAccumulator {
    /// Moment surface spans the (B, A) log-moment bounds; the stress
    /// surface is binned in log10 stress.
    pub fn new(
        moment_bounds_a: (f64, f64),
        moment_bounds_b: (f64, f64),
        stress_bounds_mpa: (f64, f64),
    ) -> Self {
        let (s_lo, s_hi) = (stress_bounds_mpa.0.log10(), stress_bounds_mpa.1.log10());
        Self {
            moment_surface: CostSurface::new(
                moment_bounds_b.0,
                moment_bounds_b.1,
                moment_bounds_a.0,
                moment_bounds_a.1,
            ),
            stress_surface: CostSurface::new(s_lo, s_hi, s_lo, s_hi),
            samples: Vec::new(),
            fit_stats: RunningStats::new(),
        }
    }

    /// Bin one evaluation. `fit` may be the pair's own cost or, in the
    /// joint inversion, the total cost across pairs.
    pub fn record(
        &mut self,
        fit: f64,
        sample: RatioSample,
        log_m0_a: f64,
        stress_a: f64,
        log_m0_b: f64,
        stress_b: f64,
    ) {
        self.moment_surface.record(log_m0_b, log_m0_a, fit);
        self.stress_surface
            .record(stress_b.log10(), stress_a.log10(), fit);
        self.fit_stats.push(fit);
        self.samples.push(RatioSample { fit, ..sample });
    }
}

/// Corner-frequency extremes among samples under the 1-sigma/2-sigma fit
/// thresholds. Samples under `f1` widen both tiers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CornerBounds {
    pub a_1: (f64, f64),
    pub a_2: (f64, f64),
    pub b_1: (f64, f64),
    pub b_2: (f64, f64),
}

impl CornerBounds {
    pub fn scan<'a>(
        samples: impl Iterator<Item = &'a RatioSample>,
        f1: f64,
        f2: f64,
        stop_at_f2: bool,
    ) -> Self {
        let mut b = Self {
            a_1: (f64::INFINITY, f64::NEG_INFINITY),
            a_2: (f64::INFINITY, f64::NEG_INFINITY),
            b_1: (f64::INFINITY, f64::NEG_INFINITY),
            b_2: (f64::INFINITY, f64::NEG_INFINITY),
        };
        for sample in samples {
            if sample.fit < f1 {
                if sample.corner_a < b.a_1.0 {
                    b.a_1.0 = sample.corner_a;
                    b.a_2.0 = sample.corner_a;
                }
                if sample.corner_a > b.a_1.1 {
                    b.a_1.1 = sample.corner_a;
                    b.a_2.1 = sample.corner_a;
                }
                if sample.corner_b < b.b_1.0 {
                    b.b_1.0 = sample.corner_b;
                    b.b_2.0 = sample.corner_b;
                }
                if sample.corner_b > b.b_1.1 {
                    b.b_1.1 = sample.corner_b;
                    b.b_2.1 = sample.corner_b;
                }
            } else if sample.fit < f2 {
                b.a_2.0 = b.a_2.0.min(sample.corner_a);
                b.a_2.1 = b.a_2.1.max(sample.corner_a);
                b.b_2.0 = b.b_2.0.min(sample.corner_b);
                b.b_2.1 = b.b_2.1.max(sample.corner_b);
            } else if stop_at_f2 {
                break;
            }
        }
        b
    }
}

pub(crate) fn assemble_estimate(
    event_id_a: &str,
    event_id_b: &str,
    model: &SourceSpectrumModel,
    point: (f64, f64, f64, f64),
    misfit: f64,
    bounds: CornerBounds,
    acc: PairAccumulator,
    moment_bounds_a: (f64, f64),
    moment_bounds_b: (f64, f64),
    stress_bounds_mpa: (f64, f64),
) -> EventPairEstimate {
    let (log_m0_a, stress_a, log_m0_b, stress_b) = point;
    EventPairEstimate {
        event_id_a: event_id_a.to_string(),
        event_id_b: event_id_b.to_string(),
        moment_a: log_m0_a,
        apparent_stress_a_mpa: stress_a,
        corner_a_hz: model.corner_freq_from_stress_m0(10f64.powf(log_m0_a), stress_a),
        corner_a_1_min: bounds.a_1.0,
        corner_a_1_max: bounds.a_1.1,
        corner_a_2_min: bounds.a_2.0,
        corner_a_2_max: bounds.a_2.1,
        moment_b: log_m0_b,
        apparent_stress_b_mpa: stress_b,
        corner_b_hz: model.corner_freq_from_stress_m0(10f64.powf(log_m0_b), stress_b),
        corner_b_1_min: bounds.b_1.0,
        corner_b_1_max: bounds.b_1.1,
        corner_b_2_min: bounds.b_2.0,
        corner_b_2_max: bounds.b_2.1,
        misfit,
        moment_surface: acc.moment_surface,
        stress_surface: acc.stress_surface,
        moment_bounds_a,
        moment_bounds_b,
        stress_bounds_mpa,
    }
}
