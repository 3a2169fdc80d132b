//! Best-fit Mw and apparent stress per event, with sampling-based
//! uncertainty.
//!
//! The fit minimizes the weighted CV(RMSD) between the measured per-band
//! log amplitudes and the MDAC model spectrum over (Mw, apparent stress).
//! Every cost evaluation is recorded; the recorded cloud provides the
//! moment/stress/corner summary statistics and the 1-sigma/2-sigma
//! extreme-value bounds. Slow convergence triggers an exhaustive grid pass
//! whose samples feed the same cloud.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{EstimatorConfig, MdacFi};
use crate::constants::{MW_FIT_POPULATION, MW_FIT_RESTARTS, MW_GRID_STEPS};
use crate::error::MeasurementError;
use crate::optimizer::{minimize, CmaesOptions, PointChecker};
use crate::result::MwEstimate;
use crate::shape::counter_seed;
use crate::source::energy::integrate_energy;
use crate::source::model::{mw_in_dyne, mw_to_m0, SourceSpectrumModel};
use crate::types::{BandSummary, EventId, FrequencyBand, Phase};

/// One recorded cost evaluation.
#[derive(Debug, Clone, Copy)]
struct Sample {
    fit: f64,
    mw: f64,
    stress: f64,
    corner: f64,
}

#[derive(Default)]
struct SampleCloud {
    samples: Vec<Sample>,
    mw: crate::statistics::RunningStats,
    stress: crate::statistics::RunningStats,
    fit: crate::statistics::RunningStats,
    corner: crate::statistics::RunningStats,
}

impl SampleCloud {
    fn record(&mut self, sample: Sample) {
        self.mw.push(sample.mw);
        self.stress.push(sample.stress);
        self.fit.push(sample.fit);
        self.corner.push(sample.corner);
        self.samples.push(sample);
    }
}

/// Fits event spectra against the MDAC model.
#[derive(Debug, Clone)]
pub struct MomentStressEstimator {
    config: EstimatorConfig,
    fi: MdacFi,
    phase: Phase,
    seed: u64,
}

impl MomentStressEstimator {
    pub fn new(config: EstimatorConfig, fi: MdacFi, phase: Phase, seed: u64) -> Self {
        Self {
            config,
            fi,
            phase,
            seed,
        }
    }

    /// Model carrying a trial stress: psi zeroed so sigma applies at every
    /// moment.
    fn trial_model(&self, stress_mpa: f64) -> SourceSpectrumModel {
        SourceSpectrumModel::new(MdacFi {
            sigma: stress_mpa,
            psi: 0.0,
            ..self.fi
        })
    }

    /// Fit one event. `None` when no band has a positive mean amplitude.
    pub fn fit_mw(
        &self,
        event_id: &str,
        measurements: &BTreeMap<FrequencyBand, BandSummary>,
        weighting: BandWeighting,
    ) -> Option<MwEstimate> {
        let usable: Vec<(FrequencyBand, BandSummary)> = measurements
            .iter()
            .filter(|(_, summary)| summary.mean_amplitude > 0.0)
            .map(|(band, summary)| (*band, *summary))
            .collect();
        if usable.is_empty() {
            let err = MeasurementError::NoUsableMeasurements { event_id: event_id.to_string() };
            warn!(%err, "skipping event");
            return None;
        }
        let data_count: usize = usable.iter().map(|(_, s)| s.count as usize).sum();
        let weights = weighting.weights(&usable);
        let observed: Vec<f64> = usable.iter().map(|(_, s)| s.mean_amplitude).collect();
        let centers: Vec<f64> = usable.iter().map(|(band, _)| band.center_hz()).collect();

        let cloud = Mutex::new(SampleCloud::default());
        let cost = |point: &[f64]| -> f64 {
            let mw = point[0];
            let stress = point[1];
            let model = self.trial_model(stress);
            let predicted: Vec<f64> = centers
                .iter()
                .map(|&f| model.log_amp_dyne(mw, f, self.phase))
                .collect();
            let fit = crate::statistics::weighted_cv_rmsd(&weights, &predicted, &observed)
                .unwrap_or(f64::MAX);
            let corner = model.corner_frequency_hz(mw);
            cloud.lock().unwrap().record(Sample {
                fit,
                mw,
                stress,
                corner,
            });
            fit
        };

        let lower = [self.config.min_mw, self.config.min_apparent_stress_mpa];
        let upper = [self.config.max_mw, self.config.max_apparent_stress_mpa];

        let mut best_mw = lower[0];
        let mut best_stress = lower[1];
        let mut best_fit = f64::MAX;
        let mut iterations = self.config.iteration_cutoff;
        for restart in 0..MW_FIT_RESTARTS {
            let run_seed = counter_seed(self.seed, restart);
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(run_seed);
            let start = [
                rng.random_range(self.config.min_mw..self.config.max_mw),
                rng.random_range(
                    self.config.min_apparent_stress_mpa..self.config.max_apparent_stress_mpa,
                ),
            ];
            let options = CmaesOptions {
                population: MW_FIT_POPULATION,
                sigma: vec![0.5, 1.0],
                max_iterations: 1_000,
                max_evaluations: 1_000_000,
                stop_fitness: None,
                seed: run_seed,
                checker: PointChecker::new(1e-5, 1e-5, 100_000),
            };
            let outcome = minimize(cost, &start, &lower, &upper, &options);
            if outcome.value < best_fit {
                best_fit = outcome.value;
                best_mw = outcome.point[0];
                best_stress = outcome.point[1];
                iterations = outcome.iterations;
            }
        }

        if iterations >= self.config.iteration_cutoff {
            warn!(event_id, "slow Mw convergence, running grid refinement");
            let mw_step = (self.config.max_mw - self.config.min_mw) / MW_GRID_STEPS as f64;
            let stress_step = (self.config.max_apparent_stress_mpa
                - self.config.min_apparent_stress_mpa)
                / MW_GRID_STEPS as f64;
            for i in 0..MW_GRID_STEPS {
                let mw = self.config.min_mw + i as f64 * mw_step;
                for j in 0..MW_GRID_STEPS {
                    let stress =
                        self.config.min_apparent_stress_mpa + j as f64 * stress_step;
                    let fit = cost(&[mw, stress]);
                    if fit < best_fit {
                        best_fit = fit;
                        best_mw = mw;
                        best_stress = stress;
                    }
                    iterations += 1;
                }
            }
        }

        let cloud = cloud.into_inner().unwrap();
        let n = cloud.fit.count();
        let se = (cloud.fit.variance() / (n.saturating_sub(2).max(1)) as f64).sqrt();
        let f1 = best_fit + se;
        let f2 = f1 + 2.0 * se;

        let mut sorted = cloud.samples.clone();
        sorted.sort_by(|a, b| a.fit.total_cmp(&b.fit));

        let mut b = Bounds::default();
        for sample in &sorted {
            if sample.fit < f1 {
                b.take_1(sample);
            }
            if sample.fit < f2 {
                b.take_2(sample);
            } else {
                break;
            }
        }

        let best_model = self.trial_model(best_stress);
        let corner_frequency_hz = best_model.corner_frequency_hz(best_mw);

        let band_amplitudes: BTreeMap<FrequencyBand, f64> = usable
            .iter()
            .map(|(band, s)| (*band, s.mean_amplitude))
            .collect();
        let energy = integrate_energy(&band_amplitudes, best_mw, best_stress, &best_model);

        let lowest = usable.first().map(|(band, _)| band.low_hz()).unwrap_or(0.0);
        let highest = usable
            .last()
            .map(|(band, _)| band.high_hz())
            .unwrap_or(f64::MAX);
        let likely_poorly_constrained = iterations > self.config.iteration_cutoff
            || corner_frequency_hz < lowest
            || corner_frequency_hz > highest
            || (b.mw_2_max - b.mw_2_min) > self.config.poorly_constrained_mw_spread;

        let (stress_bounds_1, stress_bounds_2) = if self.config.report_stress_bounds {
            ((b.stress_1_min, b.stress_1_max), (b.stress_2_min, b.stress_2_max))
        } else {
            ((best_stress, best_stress), (best_stress, best_stress))
        };

        let log_energy_at = |mw: f64, stress: f64| -> f64 {
            best_model.energy(mw_to_m0(mw), stress).log10()
        };

        Some(MwEstimate {
            event_id: event_id.to_string(),
            log_m0: mw_in_dyne(best_mw).log10(),
            mw: best_mw,
            apparent_stress_mpa: best_stress,
            corner_frequency_hz,
            misfit: best_fit,
            mw_mean: cloud.mw.mean(),
            mw_sd: cloud.mw.std_dev(),
            stress_mean: cloud.stress.mean(),
            stress_sd: cloud.stress.std_dev(),
            misfit_mean: cloud.fit.mean(),
            misfit_sd: cloud.fit.std_dev(),
            corner_mean: cloud.corner.mean(),
            corner_sd: cloud.corner.std_dev(),
            mw_1_min: b.mw_1_min,
            mw_1_max: b.mw_1_max,
            mw_2_min: b.mw_2_min,
            mw_2_max: b.mw_2_max,
            stress_1_min: stress_bounds_1.0,
            stress_1_max: stress_bounds_1.1,
            stress_2_min: stress_bounds_2.0,
            stress_2_max: stress_bounds_2.1,
            corner_1_min: b.corner_1_min,
            corner_1_max: b.corner_1_max,
            corner_2_min: b.corner_2_min,
            corner_2_max: b.corner_2_max,
            energy_1_min: log_energy_at(b.mw_1_min, b.stress_1_min),
            energy_1_max: log_energy_at(b.mw_1_max, b.stress_1_max),
            energy_2_min: log_energy_at(b.mw_2_min, b.stress_2_min),
            energy_2_max: log_energy_at(b.mw_2_max, b.stress_2_max),
            data_count,
            iterations,
            likely_poorly_constrained,
            energy,
        })
    }
}

/// Extreme Mw/stress/corner values among samples under the 1-sigma and
/// 2-sigma misfit thresholds.
struct Bounds {
    mw_1_min: f64,
    mw_1_max: f64,
    mw_2_min: f64,
    mw_2_max: f64,
    stress_1_min: f64,
    stress_1_max: f64,
    stress_2_min: f64,
    stress_2_max: f64,
    corner_1_min: f64,
    corner_1_max: f64,
    corner_2_min: f64,
    corner_2_max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            mw_1_min: f64::INFINITY,
            mw_1_max: f64::NEG_INFINITY,
            mw_2_min: f64::INFINITY,
            mw_2_max: f64::NEG_INFINITY,
            stress_1_min: f64::INFINITY,
            stress_1_max: f64::NEG_INFINITY,
            stress_2_min: f64::INFINITY,
            stress_2_max: f64::NEG_INFINITY,
            corner_1_min: f64::INFINITY,
            corner_1_max: f64::NEG_INFINITY,
            corner_2_min: f64::INFINITY,
            corner_2_max: f64::NEG_INFINITY,
        }
    }
}

impl Bounds {
    fn take_1(&mut self, s: &Sample) {
        if s.mw < self.mw_1_min {
            self.mw_1_min = s.mw;
            self.stress_1_min = s.stress;
        }
        if s.mw > self.mw_1_max {
            self.mw_1_max = s.mw;
            self.stress_1_max = s.stress;
        }
        self.corner_1_min = self.corner_1_min.min(s.corner);
        self.corner_1_max = self.corner_1_max.max(s.corner);
    }

    fn take_2(&mut self, s: &Sample) {
        if s.mw < self.mw_2_min {
            self.mw_2_min = s.mw;
            self.stress_2_min = s.stress;
        }
        if s.mw > self.mw_2_max {
            self.mw_2_max = s.mw;
            self.stress_2_max = s.stress;
        }
        self.corner_2_min = self.corner_2_min.min(s.corner);
        self.corner_2_max = self.corner_2_max.max(s.corner);
    }
}

/// Per-event choice of band weighting for the spectrum fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandWeighting {
    /// Every band counts equally.
    Uniform,
    /// Inverse standard-error weights, with the two lowest bands doubled
    /// past the maximum so the long-period levels anchor the moment.
    FavorLowFrequencies,
}

impl BandWeighting {
    fn weights(self, usable: &[(FrequencyBand, BandSummary)]) -> Vec<f64> {
        match self {
            BandWeighting::Uniform => vec![1.0; usable.len()],
            BandWeighting::FavorLowFrequencies => {
                let mut weights: Vec<f64> = usable
                    .iter()
                    .map(|(_, s)| {
                        if s.count > 1 && s.std_dev.is_finite() && s.std_dev > 0.0 {
                            let w = 1.0 + 1.0 / (s.std_dev / (s.count as f64).sqrt());
                            if w.is_finite() {
                                w
                            } else {
                                1.0
                            }
                        } else {
                            1.0
                        }
                    })
                    .collect();
                let max_weight = weights.iter().cloned().fold(1.0_f64, f64::max);
                for w in weights.iter_mut().take(2) {
                    *w = 2.0 * max_weight;
                }
                weights
            }
        }
    }
}

/// Fit every event in parallel; events that cannot be fit are dropped.
pub fn measure_mws(
    estimator: &MomentStressEstimator,
    events: &BTreeMap<EventId, BTreeMap<FrequencyBand, BandSummary>>,
    weighting_for: impl Fn(&str) -> BandWeighting + Sync,
) -> Vec<MwEstimate> {
    events
        .par_iter()
        .filter_map(|(event_id, measurements)| {
            estimator.fit_mw(event_id, measurements, weighting_for(event_id))
        })
        .collect()
}
