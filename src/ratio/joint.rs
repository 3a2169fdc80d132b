//! Joint multi-pair spectral-ratio inversion.
//!
//! Every unique event gets one (log10 M0, apparent stress) slot in a flat
//! parameter arena; pairs address their events through an id-to-slot map,
//! so an event shared by several pairs is constrained by all of them at
//! once. The total cost is the sum of the per-pair costs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::constants::{RATIO_JOINT_MAX_ITERATIONS, RATIO_POPULATION, RATIO_STOP_FITNESS};
use crate::optimizer::{minimize, CmaesOptions, PointChecker};
use crate::ratio::{
    assemble_estimate, pair_cost, CornerBounds, PairAccumulator, PairwiseRatioInverter,
    MomentPriors, RatioSample, StationRatioData,
};
use crate::result::EventPairEstimate;
use crate::statistics::RunningStats;
use crate::types::EventId;

/// Flat parameter arena: two consecutive slots (moment, stress) per unique
/// event, addressed through the id map.
struct ParameterArena {
    offsets: BTreeMap<EventId, usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    start: Vec<f64>,
    sigma: Vec<f64>,
}

impl ParameterArena {
    fn build(
        inverter: &PairwiseRatioInverter,
        pairs: &BTreeMap<(EventId, EventId), StationRatioData>,
        priors: &MomentPriors,
    ) -> Self {
        let mut arena = ParameterArena {
            offsets: BTreeMap::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            start: Vec::new(),
            sigma: Vec::new(),
        };
        let stress_bounds = inverter.stress_bounds();
        for (event_id_a, event_id_b) in pairs.keys() {
            for event_id in [event_id_a, event_id_b] {
                if arena.offsets.contains_key(event_id) {
                    continue;
                }
                let moment_bounds = inverter.moment_bounds(priors.get(event_id).copied());
                arena.offsets.insert(event_id.clone(), arena.lower.len());
                for (lo, hi) in [moment_bounds, stress_bounds] {
                    arena.lower.push(lo);
                    arena.upper.push(hi);
                    arena.start.push(lo + (hi - lo) / 2.0);
                    arena.sigma.push((hi - lo) / 2.0);
                }
            }
        }
        arena
    }

    fn offset(&self, event_id: &str) -> usize {
        self.offsets[event_id]
    }

    fn moment_bounds(&self, event_id: &str) -> (f64, f64) {
        let i = self.offset(event_id);
        (self.lower[i], self.upper[i])
    }
}

/// Invert all pairs simultaneously. Returns one estimate per input pair,
/// in key order; per-pair surfaces and corner bounds come from the shared
/// run's evaluations.
pub fn invert_joint(
    inverter: &PairwiseRatioInverter,
    pairs: &BTreeMap<(EventId, EventId), StationRatioData>,
    priors: &MomentPriors,
) -> Vec<EventPairEstimate> {
    if pairs.is_empty() {
        return Vec::new();
    }
    let arena = ParameterArena::build(inverter, pairs, priors);
    let stress_bounds = inverter.stress_bounds();

    // Surface axes span the union of the events' bounds on each side of
    // the ratio.
    let axis = |side: usize| {
        pairs.keys().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), key| {
                let id = if side == 0 { &key.0 } else { &key.1 };
                let b = arena.moment_bounds(id);
                (lo.min(b.0), hi.max(b.1))
            },
        )
    };
    let a_axis = axis(0);
    let b_axis = axis(1);

    let mut accs: Vec<PairAccumulator> = pairs
        .keys()
        .map(|_| PairAccumulator::new(a_axis, b_axis, stress_bounds))
        .collect();
    let mut total_stats = RunningStats::new();

    let outcome = {
        let cost = |point: &[f64]| -> f64 {
            let mut evaluations: Vec<(RatioSample, f64, f64, f64, f64)> =
                Vec::with_capacity(accs.len());
            let mut total = 0.0;
            for ((event_id_a, event_id_b), data) in pairs {
                let ia = arena.offset(event_id_a);
                let ib = arena.offset(event_id_b);
                let (m_a, s_a) = (point[ia], point[ia + 1]);
                let (m_b, s_b) = (point[ib], point[ib + 1]);
                let sample = pair_cost(inverter.model(), data, m_a, s_a, m_b, s_b);
                total += sample.fit;
                evaluations.push((sample, m_a, s_a, m_b, s_b));
            }
            total_stats.push(total);
            for (acc, (sample, m_a, s_a, m_b, s_b)) in accs.iter_mut().zip(evaluations) {
                // Surfaces show the pair's own misfit; the bound scan uses
                // the joint total the optimizer actually minimized.
                acc.moment_surface.record(m_b, m_a, sample.fit);
                acc.stress_surface
                    .record(s_b.log10(), s_a.log10(), sample.fit);
                acc.fit_stats.push(sample.fit);
                acc.samples.push(RatioSample {
                    fit: total,
                    ..sample
                });
            }
            total
        };
        minimize(
            cost,
            &arena.start,
            &arena.lower,
            &arena.upper,
            &CmaesOptions {
                population: RATIO_POPULATION,
                sigma: arena.sigma.clone(),
                max_iterations: RATIO_JOINT_MAX_ITERATIONS,
                max_evaluations: 10_000_000,
                stop_fitness: Some(RATIO_STOP_FITNESS),
                seed: inverter.seed(),
                checker: PointChecker::new(1e-3, 1e-3, 1_000_000),
            },
        )
    };
    debug!(
        pairs = pairs.len(),
        events = arena.offsets.len(),
        misfit = outcome.value,
        evaluations = outcome.evaluations,
        "joint ratio inversion finished"
    );

    let n = total_stats.count() as f64;
    let se = total_stats.std_dev() / (n - 4.0 * pairs.len() as f64).max(1.0).sqrt();
    let f1 = outcome.value + se;
    let f2 = f1 + 2.0 * se;

    pairs
        .keys()
        .zip(accs)
        .map(|((event_id_a, event_id_b), acc)| {
            let ia = arena.offset(event_id_a);
            let ib = arena.offset(event_id_b);
            let point = (
                outcome.point[ia],
                outcome.point[ia + 1],
                outcome.point[ib],
                outcome.point[ib + 1],
            );
            let bounds = CornerBounds::scan(acc.samples.iter(), f1, f2, false);
            assemble_estimate(
                event_id_a,
                event_id_b,
                inverter.model(),
                point,
                outcome.value,
                bounds,
                acc,
                arena.moment_bounds(event_id_a),
                arena.moment_bounds(event_id_b),
                stress_bounds,
            )
        })
        .collect()
}
