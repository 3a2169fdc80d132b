//! Streaming moments and misfit criteria.

/// Welford running mean/variance accumulator.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n-1 denominator); 0 below two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Coefficient of variation of the root-mean-square difference:
/// `sqrt(Σ(data - reference)² / Σ reference²)` over the overlapping length.
///
/// Returns `None` when the overlap is empty or the reference has zero
/// energy.
pub fn cv_rmsd(data: &[f64], reference: &[f64]) -> Option<f64> {
    let n = data.len().min(reference.len());
    if n == 0 {
        return None;
    }
    let sum_sq_ref: f64 = reference[..n].iter().map(|r| r * r).sum();
    if sum_sq_ref == 0.0 {
        return None;
    }
    let sum_sq_diff: f64 = data[..n]
        .iter()
        .zip(&reference[..n])
        .map(|(d, r)| (d - r) * (d - r))
        .sum();
    Some((sum_sq_diff / sum_sq_ref).sqrt())
}

/// [`cv_rmsd`] with a per-point weight applied to both series before the
/// ratio is formed, so heavily weighted points dominate the numerator and
/// the denominator alike.
pub fn weighted_cv_rmsd(weights: &[f64], data: &[f64], reference: &[f64]) -> Option<f64> {
    let n = weights.len().min(data.len()).min(reference.len());
    if n == 0 {
        return None;
    }
    let mut sum_sq_ref = 0.0;
    let mut sum_sq_diff = 0.0;
    for i in 0..n {
        let d = weights[i] * data[i];
        let r = weights[i] * reference[i];
        sum_sq_ref += r * r;
        sum_sq_diff += (d - r) * (d - r);
    }
    if sum_sq_ref == 0.0 {
        return None;
    }
    Some((sum_sq_diff / sum_sq_ref).sqrt())
}

/// Median of a slice; `None` when empty. Copies and sorts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Ordinary least-squares line `y = intercept + slope * x`.
///
/// Returns `None` for fewer than two points or a degenerate x spread.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x: f64 = xs[..n].iter().sum::<f64>() / nf;
    let mean_y: f64 = ys[..n].iter().sum::<f64>() / nf;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        sxx += dx * dx;
        sxy += dx * (ys[i] - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stats_match_direct_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut stats = RunningStats::new();
        for v in values {
            stats.push(v);
        }
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        // Sample variance of the same series is 32/7.
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn cv_rmsd_is_zero_for_identical_series() {
        let s = [1.0, 2.0, 3.0];
        assert_eq!(cv_rmsd(&s, &s), Some(0.0));
    }

    #[test]
    fn cv_rmsd_rejects_zero_reference() {
        assert_eq!(cv_rmsd(&[1.0, 2.0], &[0.0, 0.0]), None);
        assert_eq!(cv_rmsd(&[], &[]), None);
    }

    #[test]
    fn weighted_cv_rmsd_downweights_points() {
        let data = [1.0, 10.0];
        let reference = [1.0, 1.0];
        let all = weighted_cv_rmsd(&[1.0, 1.0], &data, &reference).unwrap();
        let damped = weighted_cv_rmsd(&[1.0, 0.01], &data, &reference).unwrap();
        assert!(damped < all);
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn regression_recovers_exact_line() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.5 - 0.5 * x).collect();
        let (intercept, slope) = linear_regression(&xs, &ys).unwrap();
        assert!((intercept - 2.5).abs() < 1e-12);
        assert!((slope + 0.5).abs() < 1e-12);
    }
}
