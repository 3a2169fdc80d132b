//! Bounded CMA-ES minimizer.
//!
//! Covariance Matrix Adaptation Evolution Strategy (Hansen's reference
//! formulation) over a box-constrained search space. Candidates that land
//! outside the box are repaired by clamping before evaluation, so the cost
//! function only ever sees feasible points.
//!
//! The per-axis `sigma` vector sets the initial search scale in each
//! coordinate: the largest entry becomes the global step size and the
//! ratios seed the diagonal of the covariance matrix, so axes with very
//! different natural scales (e.g. a 0..=5000 curve parameter next to a
//! 0..=1 decay rate) are explored proportionately from the first
//! generation.

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::convergence::PointChecker;

/// Settings for one [`minimize`] call.
#[derive(Debug, Clone)]
pub struct CmaesOptions {
    /// Candidates per generation (lambda).
    pub population: usize,
    /// Per-axis initial step scale; must match the problem dimension.
    pub sigma: Vec<f64>,
    /// Generation cap.
    pub max_iterations: usize,
    /// Cost-function evaluation cap.
    pub max_evaluations: usize,
    /// Terminate early once the best cost drops to or below this value.
    pub stop_fitness: Option<f64>,
    /// Seed for the candidate-sampling stream.
    pub seed: u64,
    /// Generation-to-generation best-point delta test.
    pub checker: PointChecker,
}

/// Result of a [`minimize`] call.
#[derive(Debug, Clone)]
pub struct OptimOutcome {
    /// Best point ever evaluated (within bounds).
    pub point: Vec<f64>,
    /// Cost at `point`.
    pub value: f64,
    /// Generations run.
    pub iterations: usize,
    /// Cost-function evaluations spent.
    pub evaluations: usize,
    /// False when the run stopped on a budget rather than the checker or
    /// stop fitness.
    pub converged: bool,
}

/// Minimize `cost` over the box `[lower, upper]`, starting from `start`.
///
/// `start`, `lower`, `upper`, and `options.sigma` must share one length.
/// Non-finite costs are treated as `f64::MAX` so a partially infeasible
/// model cannot poison the ranking.
pub fn minimize<F>(
    mut cost: F,
    start: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &CmaesOptions,
) -> OptimOutcome
where
    F: FnMut(&[f64]) -> f64,
{
    let n = start.len();
    debug_assert_eq!(lower.len(), n);
    debug_assert_eq!(upper.len(), n);
    debug_assert_eq!(options.sigma.len(), n);

    let lambda = options.population.max(4);
    let mu = lambda / 2;

    // Log-linear recombination weights.
    let raw: Vec<f64> = (0..mu)
        .map(|i| ((mu as f64) + 0.5).ln() - ((i + 1) as f64).ln())
        .collect();
    let wsum: f64 = raw.iter().sum();
    let weights: Vec<f64> = raw.iter().map(|w| w / wsum).collect();
    let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

    let nf = n as f64;
    let cc = (4.0 + mueff / nf) / (nf + 4.0 + 2.0 * mueff / nf);
    let cs = (mueff + 2.0) / (nf + mueff + 5.0);
    let c1 = 2.0 / ((nf + 1.3).powi(2) + mueff);
    let cmu = (1.0 - c1).min(2.0 * (mueff - 2.0 + 1.0 / mueff) / ((nf + 2.0).powi(2) + mueff));
    let damps = 1.0 + 2.0 * (((mueff - 1.0) / (nf + 1.0)).sqrt() - 1.0).max(0.0) + cs;
    let chi_n = nf.sqrt() * (1.0 - 1.0 / (4.0 * nf) + 1.0 / (21.0 * nf * nf));

    // Global step size from the largest axis scale; the ratios go into C.
    let sigma0 = options
        .sigma
        .iter()
        .cloned()
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    let mut sigma = sigma0;
    let mut cov = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let s = (options.sigma[i] / sigma0).max(1e-12);
        cov[(i, i)] = s * s;
    }

    let mut mean = DVector::from_iterator(
        n,
        start
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(&x, (&lo, &hi))| x.clamp(lo, hi)),
    );
    let mut ps = DVector::<f64>::zeros(n);
    let mut pc = DVector::<f64>::zeros(n);

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(options.seed);
    let mut checker = options.checker.clone();

    let mut best_point: Vec<f64> = mean.iter().cloned().collect();
    let mut best_value = f64::MAX;
    let mut prev_gen_best: Option<Vec<f64>> = None;

    let mut evaluations = 0usize;
    let mut iterations = 0usize;
    let mut converged = false;

    'outer: while iterations < options.max_iterations && evaluations < options.max_evaluations {
        iterations += 1;

        // Refresh the sampling basis. n is small here (2-4 for curve fits,
        // a few dozen for joint inversions), so a full eigendecomposition
        // per generation is cheap.
        let sym = (&cov + cov.transpose()) * 0.5;
        let eigen = sym.clone().symmetric_eigen();
        let mut d = eigen.eigenvalues.clone();
        for v in d.iter_mut() {
            if !v.is_finite() || *v < 1e-20 {
                *v = 1e-20;
            }
            *v = v.sqrt();
        }
        let basis = eigen.eigenvectors;
        cov = sym;

        // Sample, repair, evaluate.
        let mut generation: Vec<(f64, DVector<f64>, DVector<f64>)> =
            Vec::with_capacity(lambda);
        for _ in 0..lambda {
            let z = DVector::from_fn(n, |_, _| standard_normal(&mut rng));
            let y = &basis * z.component_mul(&d);
            let mut x = &mean + &y * sigma;
            for i in 0..n {
                x[i] = x[i].clamp(lower[i], upper[i]);
            }
            let mut f = cost(x.as_slice());
            if !f.is_finite() {
                f = f64::MAX;
            }
            evaluations += 1;
            // Repaired displacement, used for the covariance update.
            let y_rep = (&x - &mean) / sigma;
            generation.push((f, x, y_rep));
            if evaluations >= options.max_evaluations {
                break;
            }
        }
        generation.sort_by(|a, b| a.0.total_cmp(&b.0));

        let gen_best: Vec<f64> = generation[0].1.iter().cloned().collect();
        if generation[0].0 < best_value {
            best_value = generation[0].0;
            best_point = gen_best.clone();
        }
        if generation.len() < mu {
            break;
        }

        // Recombine the top mu.
        let mut new_mean = DVector::<f64>::zeros(n);
        for (w, (_, x, _)) in weights.iter().zip(generation.iter()) {
            new_mean += x * *w;
        }
        let y_w = (&new_mean - &mean) / sigma;
        mean = new_mean;

        // C^(-1/2) through the basis we already have.
        let mut inv_d_proj = basis.transpose() * &y_w;
        for i in 0..n {
            inv_d_proj[i] /= d[i];
        }
        let c_inv_sqrt_yw = &basis * inv_d_proj;

        ps = &ps * (1.0 - cs) + c_inv_sqrt_yw * (cs * (2.0 - cs) * mueff).sqrt();
        let ps_norm = ps.norm();
        let hsig = ps_norm
            / (1.0 - (1.0 - cs).powi(2 * iterations as i32)).sqrt()
            / chi_n
            < 1.4 + 2.0 / (nf + 1.0);
        let hs = if hsig { 1.0 } else { 0.0 };
        pc = &pc * (1.0 - cc) + &y_w * (hs * (cc * (2.0 - cc) * mueff).sqrt());

        let mut rank_mu = DMatrix::<f64>::zeros(n, n);
        for (w, (_, _, y)) in weights.iter().zip(generation.iter()) {
            rank_mu += (y * y.transpose()) * *w;
        }
        cov = &cov * (1.0 - c1 - cmu)
            + (&pc * pc.transpose() + &cov * ((1.0 - hs) * cc * (2.0 - cc))) * c1
            + rank_mu * cmu;

        sigma *= ((cs / damps) * (ps_norm / chi_n - 1.0)).exp();
        if !sigma.is_finite() || sigma > 1e12 * sigma0 {
            break;
        }

        if let Some(sf) = options.stop_fitness {
            if best_value <= sf {
                converged = true;
                break 'outer;
            }
        }
        if let Some(prev) = prev_gen_best.as_deref() {
            if checker.converged(prev, &gen_best) {
                converged = true;
                break 'outer;
            }
        }
        prev_gen_best = Some(gen_best);
    }

    OptimOutcome {
        point: best_point,
        value: best_value,
        iterations,
        evaluations,
        converged,
    }
}

/// One standard-normal draw via the Box-Muller transform.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
