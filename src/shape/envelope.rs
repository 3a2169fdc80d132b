//! Per-waveform coda decay fit.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::ShapeConstraints;
use crate::constants::{MIN_AUTOPICK_WINDOW_SAMPLES, SHAPE_POPULATION};
use crate::optimizer::{minimize, CmaesOptions, PointChecker};
use crate::result::EnvelopeFit;
use crate::statistics::linear_regression;

use super::huber_loss;

/// Fit `intercept - gamma*log10(t) + beta*t` to a coda envelope segment,
/// `t` in seconds from one second before the window start.
///
/// The initial guess comes from an ordinary least-squares line through the
/// segment; a degenerate regression falls back to a random intercept
/// inside the configured bounds, and a slope outside the beta bounds is
/// replaced by the minimum beta. With `auto_pick` set, the window length
/// itself becomes a fourth fitted parameter and the per-sample loss is
/// penalized for short windows, so the fit trades tail misfit against
/// usable coda duration.
pub fn fit_envelope(
    samples: &[f64],
    sample_rate: f64,
    constraints: &ShapeConstraints,
    auto_pick: bool,
    seed: u64,
) -> EnvelopeFit {
    let full_len_sec = samples.len() as f64 / sample_rate;
    let mut fit = EnvelopeFit {
        intercept: 0.0,
        gamma: 0.0,
        beta: 0.0,
        end_time_sec: full_len_sec,
        error: f64::MAX,
    };
    if samples.is_empty() {
        return fit;
    }

    let times: Vec<f64> = (0..samples.len())
        .map(|j| j as f64 / sample_rate + 1.0)
        .collect();

    let (mut start_intercept, mut start_beta) = match linear_regression(&times, samples) {
        Some((intercept, slope)) if intercept.is_finite() && slope.is_finite() => {
            (intercept, slope)
        }
        _ => {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            (
                rng.random_range(constraints.min_intercept..constraints.max_intercept),
                constraints.min_beta,
            )
        }
    };
    if start_beta > constraints.max_beta || start_beta < constraints.min_beta {
        start_beta = constraints.min_beta;
    }
    if !start_intercept.is_finite() {
        start_intercept = constraints.min_intercept;
    }

    let min_len_sec =
        (MIN_AUTOPICK_WINDOW_SAMPLES as f64 / sample_rate).min(full_len_sec);
    let sample_loss = |point: &[f64]| -> (f64, f64) {
        let intercept = point[0];
        let gamma = point[1];
        let beta = point[2];
        let end_sec = if auto_pick { point[3] } else { full_len_sec };
        let count = ((end_sec * sample_rate) as usize)
            .clamp(MIN_AUTOPICK_WINDOW_SAMPLES.min(samples.len()), samples.len());
        let mut sum = 0.0;
        for j in 0..count {
            let t = times[j];
            let predicted = intercept - gamma * t.log10() + beta * t;
            sum += huber_loss(predicted, samples[j]);
        }
        (sum / count as f64, count as f64 / samples.len() as f64)
    };

    let cost = |point: &[f64]| -> f64 {
        let (mean_loss, fill) = sample_loss(point);
        if auto_pick {
            mean_loss + constraints.length_weight * (1.0 - fill)
        } else {
            mean_loss
        }
    };

    let mut start = vec![start_intercept, constraints.min_gamma, start_beta];
    let mut lower = vec![-f64::MAX, constraints.min_gamma, constraints.min_beta];
    let mut upper = vec![f64::MAX, constraints.max_gamma, constraints.max_beta];
    let mut sigma = vec![0.5, 0.05, 0.05];
    if auto_pick {
        start.push(full_len_sec);
        lower.push(min_len_sec);
        upper.push(full_len_sec);
        sigma.push((full_len_sec / 4.0).max(1.0 / sample_rate));
    }

    let options = CmaesOptions {
        population: SHAPE_POPULATION,
        sigma,
        max_iterations: 1_000,
        max_evaluations: constraints.fitting_point_count,
        stop_fitness: None,
        seed,
        checker: PointChecker::new(5e-4, -1.0, 100_000),
    };
    let outcome = minimize(cost, &start, &lower, &upper, &options);

    fit.intercept = outcome.point[0];
    fit.gamma = outcome.point[1];
    fit.beta = outcome.point[2];
    if auto_pick {
        fit.end_time_sec = outcome.point[3];
    }
    fit.error = outcome.value;
    fit
}
