mod differential;
mod polish;
pub mod traits;

pub use differential::DifferentialEvolution;
pub use polish::BoundedBfgs;
pub use traits::{clamp_to_bounds, OptimizationCallback, Problem, Solver, SolverResult};

use crate::core::FitPrecision;
use log::debug;

/// Global stage for the requested precision preset
pub fn global_solver(precision: FitPrecision, seed: Option<u64>) -> DifferentialEvolution {
    let solver =
        DifferentialEvolution::new(precision.max_generations(), precision.population_factor());
    debug!(
        "{:?} preset: {} generations, population factor {}",
        precision,
        precision.max_generations(),
        precision.population_factor()
    );
    match seed {
        Some(seed) => solver.with_seed(seed),
        None => solver,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{MagsafError, MagsafResult};
    use std::cell::Cell;

    /// Sum of squares around `target`; fails as cancelled after `fail_after` evaluations
    pub struct Quadratic {
        pub target: Vec<f64>,
        pub bounds: Vec<(f64, f64)>,
        pub initial: Vec<f64>,
        pub fail_after: Option<usize>,
        pub evals: Cell<usize>,
    }

    impl Quadratic {
        pub fn new(target: Vec<f64>, bounds: Vec<(f64, f64)>) -> Self {
            let initial = bounds.iter().map(|(lo, hi)| 0.5 * (lo + hi)).collect();
            Self {
                target,
                bounds,
                initial,
                fail_after: None,
                evals: Cell::new(0),
            }
        }
    }

    impl Problem for Quadratic {
        fn cost(&self, params: &[f64]) -> MagsafResult<f64> {
            self.evals.set(self.evals.get() + 1);
            if self.fail_after.is_some_and(|n| self.evals.get() > n) {
                return Err(MagsafError::Cancelled);
            }
            Ok(params.iter().zip(&self.target).map(|(p, t)| (p - t).powi(2)).sum())
        }

        fn num_params(&self) -> usize {
            self.target.len()
        }

        fn initial_params(&self) -> &[f64] {
            &self.initial
        }

        fn bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
    }

    #[derive(Default)]
    pub struct Recorder {
        pub costs: Vec<f64>,
    }

    impl OptimizationCallback for Recorder {
        fn on_iteration(
            &mut self,
            _iteration: u32,
            _params: &[f64],
            cost: f64,
        ) -> MagsafResult<()> {
            self.costs.push(cost);
            Ok(())
        }
    }

    #[test]
    fn presets_scale_the_global_stage() {
        let fast = global_solver(FitPrecision::Fast, Some(1));
        let precise = global_solver(FitPrecision::Precise, Some(1));
        assert_eq!(fast.population_size(2), 6);
        assert_eq!(precise.population_size(2), 16);
        assert_eq!(fast.population_size(1), 5);
    }

    #[test]
    fn default_gradient_matches_analytic() {
        let problem = Quadratic::new(vec![0.2, -0.1], vec![(-1.0, 1.0), (-1.0, 1.0)]);
        let grad = problem.gradient(&[0.5, 0.5]).unwrap();
        assert!((grad[0] - 0.6).abs() < 1e-6);
        assert!((grad[1] - 1.2).abs() < 1e-6);
    }
}
