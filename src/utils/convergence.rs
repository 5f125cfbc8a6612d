//! Convergence tracking & tolerance checks for the projected CG driver.

/// Stopping criteria & stats.
#[derive(Clone, Copy, Debug)]
pub struct Convergence<T> {
    pub tol: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    /// Returns (should_stop, stats) given current `res_norm` and iteration `i`.
    ///
    /// Reaching `max_iters` stops the iteration without marking it converged.
    pub fn check(&self, res_norm: T, res0_norm: T, i: usize) -> (bool, SolveStats<T>) {
        let rel = if res0_norm > T::zero() { res_norm / res0_norm } else { res_norm };
        let converged = rel <= self.tol;
        let stop = converged || i >= self.max_iters;
        (
            stop,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_tolerance() {
        let conv = Convergence { tol: 1e-3, max_iters: 10 };
        let (stop, stats) = conv.check(1e-4, 1.0, 3);
        assert!(stop && stats.converged);
        let (stop, stats) = conv.check(1e-1, 1.0, 3);
        assert!(!stop && !stats.converged);
    }

    #[test]
    fn iteration_cap_is_not_convergence() {
        let conv = Convergence { tol: 1e-8, max_iters: 5 };
        let (stop, stats) = conv.check(0.5, 1.0, 5);
        assert!(stop);
        assert!(!stats.converged);
        assert_eq!(stats.iterations, 5);
    }
}
