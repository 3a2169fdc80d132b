//! Per-pair spectral-ratio inversion.

use tracing::debug;

use crate::config::{MdacFi, RatioInversionConfig};
use crate::constants::{
    RATIO_PAIR_MAX_ITERATIONS, RATIO_POPULATION, RATIO_STOP_FITNESS,
};
use crate::optimizer::{minimize, CmaesOptions, PointChecker};
use crate::ratio::{
    assemble_estimate, pair_cost, CornerBounds, PairAccumulator, StationRatioData,
};
use crate::result::EventPairEstimate;
use crate::source::model::mw_to_log_m0;
use crate::source::SourceSpectrumModel;

/// Axis resolution of the diagnostic grid search.
const GRID_STEPS: usize = 16;

/// Inverts one event pair's ratio measurements for (log10 M0, apparent
/// stress) of both events.
#[derive(Debug, Clone)]
pub struct PairwiseRatioInverter {
    config: RatioInversionConfig,
    model: SourceSpectrumModel,
    seed: u64,
}

impl PairwiseRatioInverter {
    pub fn new(config: RatioInversionConfig, fi: MdacFi, seed: u64) -> Self {
        Self {
            config,
            model: SourceSpectrumModel::new(fi),
            seed,
        }
    }

    pub fn model(&self) -> &SourceSpectrumModel {
        &self.model
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    /// log10(M0) search bounds for one event: the configured wide range,
    /// or the prior Mw's moment plus/minus the configured error margin.
    pub(crate) fn moment_bounds(&self, prior_mw: Option<f64>) -> (f64, f64) {
        match prior_mw {
            Some(mw) => {
                let center = mw_to_log_m0(mw);
                (
                    center - self.config.moment_error_range,
                    center + self.config.moment_error_range,
                )
            }
            None => (self.config.min_log_moment, self.config.max_log_moment),
        }
    }

    pub(crate) fn stress_bounds(&self) -> (f64, f64) {
        (
            self.config.min_apparent_stress_mpa,
            self.config.max_apparent_stress_mpa,
        )
    }

    /// CMA-ES inversion of one pair. Prior Mw estimates, when available,
    /// narrow that event's moment bounds.
    pub fn invert_pair(
        &self,
        event_id_a: &str,
        event_id_b: &str,
        data: &StationRatioData,
        prior_mw_a: Option<f64>,
        prior_mw_b: Option<f64>,
    ) -> EventPairEstimate {
        let m_bounds_a = self.moment_bounds(prior_mw_a);
        let m_bounds_b = self.moment_bounds(prior_mw_b);
        let s_bounds = self.stress_bounds();

        let lower = [m_bounds_a.0, s_bounds.0, m_bounds_b.0, s_bounds.0];
        let upper = [m_bounds_a.1, s_bounds.1, m_bounds_b.1, s_bounds.1];
        let start: Vec<f64> = lower
            .iter()
            .zip(&upper)
            .map(|(lo, hi)| lo + (hi - lo) / 2.0)
            .collect();
        let sigma: Vec<f64> = lower
            .iter()
            .zip(&upper)
            .map(|(lo, hi)| (hi - lo) / 2.0)
            .collect();

        let mut acc = PairAccumulator::new(m_bounds_a, m_bounds_b, s_bounds);
        let outcome = {
            let cost = |point: &[f64]| -> f64 {
                let sample =
                    pair_cost(&self.model, data, point[0], point[1], point[2], point[3]);
                acc.record(sample.fit, sample, point[0], point[1], point[2], point[3]);
                sample.fit
            };
            minimize(
                cost,
                &start,
                &lower,
                &upper,
                &CmaesOptions {
                    population: RATIO_POPULATION,
                    sigma,
                    max_iterations: RATIO_PAIR_MAX_ITERATIONS,
                    max_evaluations: 1_000_000,
                    stop_fitness: Some(RATIO_STOP_FITNESS),
                    seed: self.seed,
                    checker: PointChecker::new(1e-3, 1e-3, 100_000),
                },
            )
        };
        debug!(
            event_id_a,
            event_id_b,
            misfit = outcome.value,
            evaluations = outcome.evaluations,
            "pair ratio inversion finished"
        );

        let point = (
            outcome.point[0],
            outcome.point[1],
            outcome.point[2],
            outcome.point[3],
        );
        self.finish(
            event_id_a,
            event_id_b,
            point,
            outcome.value,
            acc,
            m_bounds_a,
            m_bounds_b,
            s_bounds,
        )
    }

    /// Exhaustive-grid variant over the same bounds: moments stepped
    /// linearly, stresses log-spaced. Diagnostic use; the CMA-ES path is
    /// the production one.
    pub fn grid_search_pair(
        &self,
        event_id_a: &str,
        event_id_b: &str,
        data: &StationRatioData,
        prior_mw_a: Option<f64>,
        prior_mw_b: Option<f64>,
    ) -> EventPairEstimate {
        let m_bounds_a = self.moment_bounds(prior_mw_a);
        let m_bounds_b = self.moment_bounds(prior_mw_b);
        let s_bounds = self.stress_bounds();

        let lin = |lo: f64, hi: f64, i: usize| {
            lo + (hi - lo) * i as f64 / (GRID_STEPS - 1) as f64
        };
        let log = |lo: f64, hi: f64, i: usize| {
            10f64.powf(lo.log10() + (hi.log10() - lo.log10()) * i as f64 / (GRID_STEPS - 1) as f64)
        };

        let mut acc = PairAccumulator::new(m_bounds_a, m_bounds_b, s_bounds);
        let mut best = (f64::MAX, (0.0, 0.0, 0.0, 0.0));
        for ia in 0..GRID_STEPS {
            let m_a = lin(m_bounds_a.0, m_bounds_a.1, ia);
            for ja in 0..GRID_STEPS {
                let s_a = log(s_bounds.0, s_bounds.1, ja);
                for ib in 0..GRID_STEPS {
                    let m_b = lin(m_bounds_b.0, m_bounds_b.1, ib);
                    for jb in 0..GRID_STEPS {
                        let s_b = log(s_bounds.0, s_bounds.1, jb);
                        let sample = pair_cost(&self.model, data, m_a, s_a, m_b, s_b);
                        acc.record(sample.fit, sample, m_a, s_a, m_b, s_b);
                        if sample.fit < best.0 {
                            best = (sample.fit, (m_a, s_a, m_b, s_b));
                        }
                    }
                }
            }
        }
        self.finish(
            event_id_a,
            event_id_b,
            best.1,
            best.0,
            acc,
            m_bounds_a,
            m_bounds_b,
            s_bounds,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        event_id_a: &str,
        event_id_b: &str,
        point: (f64, f64, f64, f64),
        misfit: f64,
        mut acc: PairAccumulator,
        m_bounds_a: (f64, f64),
        m_bounds_b: (f64, f64),
        s_bounds: (f64, f64),
    ) -> EventPairEstimate {
        // Sort by fit, breaking ties toward higher corner frequencies so
        // the scan's early break is deterministic.
        acc.samples.sort_by(|x, y| {
            x.fit
                .total_cmp(&y.fit)
                .then(y.corner_a.total_cmp(&x.corner_a))
                .then(y.corner_b.total_cmp(&x.corner_b))
        });
        let n = acc.fit_stats.count() as f64;
        let se = (acc.fit_stats.variance() / (n - 4.0).max(1.0)).sqrt();
        let f1 = misfit + se;
        let f2 = misfit + 2.0 * se;
        let bounds = CornerBounds::scan(acc.samples.iter(), f1, f2, true);
        assemble_estimate(
            event_id_a,
            event_id_b,
            &self.model,
            point,
            misfit,
            bounds,
            acc,
            m_bounds_a,
            m_bounds_b,
            s_bounds,
        )
    }
}
