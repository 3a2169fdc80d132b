//! Point-delta convergence test.

/// Declares convergence when successive best points agree component-wise
/// within a relative or absolute tolerance, or when the check budget is
/// exhausted.
///
/// A component passes when `|prev - curr| <= rel * max(|prev|, |curr|)`
/// or `|prev - curr| <= abs`; the point passes when every component does.
/// A negative `abs` disables the absolute branch.
#[derive(Debug, Clone)]
pub struct PointChecker {
    rel: f64,
    abs: f64,
    max_checks: usize,
    checks: usize,
}

impl PointChecker {
    pub fn new(rel: f64, abs: f64, max_checks: usize) -> Self {
        Self {
            rel,
            abs,
            max_checks,
            checks: 0,
        }
    }

    /// One convergence check. Counts against the budget; once the budget
    /// is spent, always reports converged.
    pub fn converged(&mut self, previous: &[f64], current: &[f64]) -> bool {
        self.checks += 1;
        if self.checks >= self.max_checks {
            return true;
        }
        previous.iter().zip(current).all(|(&p, &c)| {
            let diff = (p - c).abs();
            diff <= self.rel * p.abs().max(c.abs()) || diff <= self.abs
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_converge() {
        let mut checker = PointChecker::new(1e-5, 1e-5, 100);
        assert!(checker.converged(&[1.0, 2.0], &[1.0, 2.0]));
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        let mut checker = PointChecker::new(1e-3, -1.0, 100);
        // 0.05% move on a large component passes, 5% does not.
        assert!(checker.converged(&[1000.0], &[1000.5]));
        assert!(!checker.converged(&[1000.0], &[1050.0]));
    }

    #[test]
    fn negative_abs_disables_absolute_branch() {
        let mut checker = PointChecker::new(1e-6, -1.0, 100);
        // Tiny absolute move near zero, but large relatively.
        assert!(!checker.converged(&[1e-9], &[2e-9]));
    }

    #[test]
    fn check_budget_forces_convergence() {
        let mut checker = PointChecker::new(1e-12, -1.0, 3);
        assert!(!checker.converged(&[0.0], &[1.0]));
        assert!(!checker.converged(&[1.0], &[2.0]));
        assert!(checker.converged(&[2.0], &[3.0]));
    }
}
