//! Distance-dependence fits for the calibrated shape terms.
//!
//! Each term (peak velocity, linear decay beta, log-time decay gamma) is
//! fit as `f(d) = p0 - p1/(p2 + d)` against measured (value, distance)
//! pairs. The primary fitter is multi-start CMA-ES in a regularized
//! parameter space; when it fails outright or only finds physically
//! inadmissible curves it falls back to an exhaustive coarse grid over
//! hand-tuned ranges.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use tracing::trace;

use crate::config::{DistanceCurveParams, ShapeConstraints, SharedBandParameters};
use crate::constants::{INVALID_COST, UNFITTABLE};
use crate::optimizer::{minimize, CmaesOptions, PointChecker};
use crate::types::FrequencyBand;

use super::{counter_seed, huber_loss};

/// Which shape term a fit targets. Selects bounds, regularization, step
/// scales, and admissibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Velocity,
    Beta,
    Gamma,
}

/// A strategy for fitting one distance curve. Returns the fitted curve and
/// its loss; a negative loss marks an unusable fit.
pub trait GridFitter: Sync {
    fn fit_grid(
        &self,
        pairs: &[(f64, f64)],
        constraints: &ShapeConstraints,
    ) -> (DistanceCurveParams, f64);
}

/// Loss over all (value, distance) pairs for a curve in real units;
/// [`INVALID_COST`] when the curve violates the physical admissibility
/// window for its kind.
fn curve_cost(
    kind: CurveKind,
    p0: f64,
    p1: f64,
    p2: f64,
    pairs: &[(f64, f64)],
    c: &ShapeConstraints,
) -> f64 {
    let at = |d: f64| p0 - p1 / (d + p2);
    let admissible = match kind {
        CurveKind::Velocity => {
            at(c.v_dist_min) >= c.yvv_min && at(c.v_dist_max) <= c.yvv_max
        }
        CurveKind::Beta => at(c.b_dist_min) >= c.ybb_min && at(c.b_dist_max) <= c.ybb_max,
        CurveKind::Gamma => {
            // The third test rejects curves that grow with distance near
            // the restricted range.
            at(c.g_dist_min) >= c.ygg_min
                && at(c.g_dist_max) <= c.ygg_max
                && at(c.g_dist_min) >= at(c.g_dist_min + 1.0)
        }
    };
    if !admissible {
        return INVALID_COST;
    }
    pairs
        .iter()
        .map(|&(value, distance)| huber_loss(value, at(distance)))
        .sum()
}

/// Multi-start CMA-ES curve fitter in the regularized parameter space.
pub struct CmaesCurveFitter {
    pub kind: CurveKind,
    pub seed: u64,
}

impl CmaesCurveFitter {
    /// Map an optimizer-space point to real curve parameters. The p0 axis
    /// is searched scaled up by the kind's regularization weight so its
    /// bounds are comparable in magnitude to the other two axes; gamma's
    /// p1 additionally carries a configured sign flip.
    fn to_real(&self, point: &[f64], c: &ShapeConstraints) -> (f64, f64, f64) {
        match self.kind {
            CurveKind::Velocity => (point[0] / c.v0_reg, point[1], point[2]),
            CurveKind::Beta => (point[0] / c.b0_reg, point[1], point[2]),
            CurveKind::Gamma => (point[0] / c.g0_reg, point[1] * c.g1_reg, point[2]),
        }
    }

    fn bounds(&self, c: &ShapeConstraints) -> ([f64; 3], [f64; 3]) {
        match self.kind {
            CurveKind::Velocity => (
                [c.min_vp1, c.min_vp2, c.min_vp3],
                [c.max_vp1, c.max_vp2, c.max_vp3],
            ),
            CurveKind::Beta => (
                [c.min_bp1, c.min_bp2, c.min_bp3],
                [c.max_bp1, c.max_bp2, c.max_bp3],
            ),
            CurveKind::Gamma => (
                [c.min_gp1, c.min_gp2, c.min_gp3],
                [c.max_gp1, c.max_gp2, c.max_gp3],
            ),
        }
    }

    fn options(&self, seed: u64) -> CmaesOptions {
        let (sigma, population, checker) = match self.kind {
            CurveKind::Velocity => (
                vec![1.0, 75.0, 100.0],
                100,
                PointChecker::new(1e-6, -1.0, 100_000),
            ),
            CurveKind::Beta => (
                vec![0.05, 0.5, 750.0],
                50,
                PointChecker::new(1e-6, -1.0, 100_000),
            ),
            CurveKind::Gamma => (
                vec![1.0, 50.0, 50.0],
                50,
                PointChecker::new(0.005, 0.005, 100_000),
            ),
        };
        CmaesOptions {
            population,
            sigma,
            max_iterations: 1_000,
            max_evaluations: 1_000_000,
            stop_fitness: None,
            seed,
            checker,
        }
    }

    fn start(&self, lower: &[f64; 3], upper: &[f64; 3], rng: &mut Xoshiro256PlusPlus) -> [f64; 3] {
        match self.kind {
            CurveKind::Gamma => [
                rng.random_range(lower[0]..upper[0]),
                lower[1],
                lower[2],
            ],
            _ => [
                rng.random_range(lower[0]..upper[0]),
                rng.random_range(lower[1]..upper[1]),
                rng.random_range(lower[2]..upper[2]),
            ],
        }
    }
}

impl GridFitter for CmaesCurveFitter {
    fn fit_grid(
        &self,
        pairs: &[(f64, f64)],
        constraints: &ShapeConstraints,
    ) -> (DistanceCurveParams, f64) {
        let (lower, upper) = self.bounds(constraints);

        let best = (0..=constraints.iterations as u64)
            .into_par_iter()
            .map(|restart| {
                let seed = counter_seed(self.seed, restart);
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let start = self.start(&lower, &upper, &mut rng);
                minimize(
                    |point| {
                        let (p0, p1, p2) = self.to_real(point, constraints);
                        curve_cost(self.kind, p0, p1, p2, pairs, constraints)
                    },
                    &start,
                    &lower,
                    &upper,
                    &self.options(seed),
                )
            })
            .reduce_with(|a, b| if a.value <= b.value { a } else { b });

        let Some(best) = best else {
            return (DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 }, UNFITTABLE);
        };
        let (mut p0, mut p1, mut p2) = self.to_real(&best.point, constraints);
        if self.kind == CurveKind::Beta {
            // Exact zeros downstream divide or flatten the correction.
            if p0 == 0.0 {
                p0 = 1e-4;
            }
            if p1 == 0.0 {
                p1 = 1e-4;
            }
            if p2 == 0.0 {
                p2 = 1e-4;
            }
        }
        let cost = if best.value == INVALID_COST {
            UNFITTABLE
        } else {
            best.value
        };
        (DistanceCurveParams { p0, p1, p2 }, cost)
    }
}

/// Exhaustive coarse-grid fallback over the hand-tuned ranges for each
/// kind.
pub struct ExhaustiveCurveFitter {
    pub kind: CurveKind,
}

impl ExhaustiveCurveFitter {
    fn grid(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        match self.kind {
            CurveKind::Velocity => (
                (0..=45).map(|i| 2.5 + i as f64 * 0.05).collect(),
                (0..=200).map(|i| i as f64 * 2.0).collect(),
                (0..=200).map(|i| 1.0 + i as f64).collect(),
            ),
            CurveKind::Beta => (
                (-50..=201).map(|i| -(i as f64 - 1.0) * 0.001).collect(),
                (-10..=201).map(|i| (i as f64 - 1.0) * 0.01).collect(),
                (-10..=800).map(|i| i as f64 * 1.5).collect(),
            ),
            CurveKind::Gamma => (
                (1..=21).map(|i| 2.001 - (i as f64 - 1.0) * 0.1).collect(),
                (1..=101).map(|i| -(i as f64 - 1.0)).collect(),
                (1..=101).map(|i| i as f64).collect(),
            ),
        }
    }
}

impl GridFitter for ExhaustiveCurveFitter {
    fn fit_grid(
        &self,
        pairs: &[(f64, f64)],
        constraints: &ShapeConstraints,
    ) -> (DistanceCurveParams, f64) {
        let (p0s, p1s, p2s) = self.grid();
        let best = p0s
            .par_iter()
            .map(|&p0| {
                let mut local = (DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 }, INVALID_COST);
                for &p1 in &p1s {
                    for &p2 in &p2s {
                        let cost = curve_cost(self.kind, p0, p1, p2, pairs, constraints);
                        if cost < local.1 {
                            local = (DistanceCurveParams { p0, p1, p2 }, cost);
                        }
                    }
                }
                local
            })
            .reduce_with(|a, b| if a.1 <= b.1 { a } else { b });

        match best {
            Some((params, cost)) if cost < INVALID_COST => (params, cost),
            _ => (DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 }, UNFITTABLE),
        }
    }
}

/// Fit one distance curve: CMA-ES first, exhaustive grid when that fit is
/// unusable.
pub fn fit_distance_curve(
    pairs: &[(f64, f64)],
    constraints: &ShapeConstraints,
    kind: CurveKind,
    seed: u64,
) -> (DistanceCurveParams, f64) {
    let main = CmaesCurveFitter { kind, seed };
    let (params, cost) = main.fit_grid(pairs, constraints);
    if cost < 0.0 {
        trace!(?kind, "primary curve fit unusable, falling back to grid search");
        let fallback = ExhaustiveCurveFitter { kind };
        return fallback.fit_grid(pairs, constraints);
    }
    (params, cost)
}

fn fit_all(
    pairs_by_band: &BTreeMap<FrequencyBand, Vec<(f64, f64)>>,
    mut band_params: BTreeMap<FrequencyBand, SharedBandParameters>,
    constraints: &ShapeConstraints,
    kind: CurveKind,
    seed: u64,
) -> BTreeMap<FrequencyBand, SharedBandParameters> {
    let fitted: Vec<(FrequencyBand, DistanceCurveParams)> = pairs_by_band
        .iter()
        .filter(|(band, _)| band_params.contains_key(band))
        .collect::<Vec<_>>()
        .into_par_iter()
        .enumerate()
        .map(|(i, (band, pairs))| {
            let (mut params, _cost) =
                fit_distance_curve(pairs, constraints, kind, counter_seed(seed, i as u64));
            if kind == CurveKind::Beta {
                // Lower the intercept 5% to offset noise contamination
                // shallowing the fitted decay.
                params.p0 *= 1.05;
            }
            (*band, params)
        })
        .collect();

    for (band, params) in fitted {
        if let Some(shared) = band_params.get_mut(&band) {
            match kind {
                CurveKind::Velocity => shared.velocity = params,
                CurveKind::Beta => shared.beta = params,
                CurveKind::Gamma => shared.gamma = params,
            }
        }
    }
    band_params
}

/// Fit the peak-velocity distance curve for every band that has
/// calibration parameters, updating the returned map in place. Bands with
/// measurements but no parameters are skipped.
pub fn fit_all_velocity(
    pairs_by_band: &BTreeMap<FrequencyBand, Vec<(f64, f64)>>,
    band_params: BTreeMap<FrequencyBand, SharedBandParameters>,
    constraints: &ShapeConstraints,
    seed: u64,
) -> BTreeMap<FrequencyBand, SharedBandParameters> {
    fit_all(pairs_by_band, band_params, constraints, CurveKind::Velocity, seed)
}

/// As [`fit_all_velocity`] for the beta term.
pub fn fit_all_beta(
    pairs_by_band: &BTreeMap<FrequencyBand, Vec<(f64, f64)>>,
    band_params: BTreeMap<FrequencyBand, SharedBandParameters>,
    constraints: &ShapeConstraints,
    seed: u64,
) -> BTreeMap<FrequencyBand, SharedBandParameters> {
    fit_all(pairs_by_band, band_params, constraints, CurveKind::Beta, seed)
}

/// As [`fit_all_velocity`] for the gamma term.
pub fn fit_all_gamma(
    pairs_by_band: &BTreeMap<FrequencyBand, Vec<(f64, f64)>>,
    band_params: BTreeMap<FrequencyBand, SharedBandParameters>,
    constraints: &ShapeConstraints,
    seed: u64,
) -> BTreeMap<FrequencyBand, SharedBandParameters> {
    fit_all(pairs_by_band, band_params, constraints, CurveKind::Gamma, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs_from_curve(p0: f64, p1: f64, p2: f64, distances: &[f64]) -> Vec<(f64, f64)> {
        distances
            .iter()
            .map(|&d| (p0 - p1 / (p2 + d), d))
            .collect()
    }

    #[test]
    fn velocity_fit_recovers_generating_curve() {
        let constraints = ShapeConstraints::default();
        let distances: Vec<f64> = (1..=40).map(|i| i as f64 * 30.0).collect();
        // Typical Lg peak-velocity curve: ~3.4 km/s at range, slower close in.
        let pairs = pairs_from_curve(3.4, 100.0, 50.0, &distances);
        let (fit, cost) = fit_distance_curve(&pairs, &constraints, CurveKind::Velocity, 3);
        assert!(cost >= 0.0);
        for &d in &[100.0, 500.0, 1200.0] {
            let truth = 3.4 - 100.0 / (50.0 + d);
            assert!(
                (fit.evaluate(d) - truth).abs() < 0.1,
                "at {} km: {} vs {}",
                d,
                fit.evaluate(d),
                truth
            );
        }
    }

    #[test]
    fn gamma_fit_rejects_growth_with_distance() {
        let constraints = ShapeConstraints::default();
        // Gamma admissibility demands non-increasing values near the
        // restricted distance; a monotonically rising target leaves the
        // feasible curves far from the data but must still return
        // something usable or the unfittable marker, never a rising curve.
        let distances: Vec<f64> = (1..=20).map(|i| i as f64 * 50.0).collect();
        let pairs: Vec<(f64, f64)> = distances.iter().map(|&d| (0.5 + d / 1000.0, d)).collect();
        let (fit, cost) = fit_distance_curve(&pairs, &constraints, CurveKind::Gamma, 5);
        if cost >= 0.0 {
            let near = fit.evaluate(constraints.g_dist_min);
            let next = fit.evaluate(constraints.g_dist_min + 1.0);
            assert!(near >= next);
        }
    }

    #[test]
    fn impossible_bounds_report_unfittable() {
        let mut constraints = ShapeConstraints::default();
        // No curve can be above 10 km/s at distance zero given the p1
        // bounds, so every candidate is inadmissible.
        constraints.yvv_min = 10.0;
        constraints.yvv_max = 10.5;
        let pairs = pairs_from_curve(3.4, 100.0, 50.0, &[100.0, 200.0, 300.0]);
        let (_, cost) = fit_distance_curve(&pairs, &constraints, CurveKind::Velocity, 9);
        assert_eq!(cost, UNFITTABLE);
    }

    #[test]
    fn fit_all_skips_bands_without_parameters() {
        let constraints = ShapeConstraints::default();
        let band_with = FrequencyBand::new(1.0, 2.0);
        let band_without = FrequencyBand::new(2.0, 4.0);
        let distances: Vec<f64> = (1..=30).map(|i| i as f64 * 40.0).collect();
        let pairs = pairs_from_curve(3.4, 100.0, 50.0, &distances);

        let mut pairs_by_band = BTreeMap::new();
        pairs_by_band.insert(band_with, pairs.clone());
        pairs_by_band.insert(band_without, pairs);

        let mut params = BTreeMap::new();
        params.insert(band_with, test_band_params(band_with));

        let out = fit_all_velocity(&pairs_by_band, params, &constraints, 1);
        assert_eq!(out.len(), 1);
        assert!(!out[&band_with].velocity.is_unfittable());
        assert_ne!(out[&band_with].velocity.p0, 0.0);
    }

    fn test_band_params(band: FrequencyBand) -> SharedBandParameters {
        SharedBandParameters {
            band,
            velocity: DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 },
            beta: DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 },
            gamma: DistanceCurveParams { p0: 0.0, p1: 0.0, p2: 0.0 },
            s1: 0.0,
            s2: 1.0,
            xc: 100.0,
            xt: 250.0,
            q: 200.0,
            min_length_sec: 30.0,
            max_length_sec: 600.0,
            measurement_time_sec: 60.0,
        }
    }
}
