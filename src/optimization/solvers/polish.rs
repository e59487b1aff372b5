use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use crate::core::{MagsafError, MagsafResult};
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::BFGS;

/// Problem seen by argmin: coordinates scaled to the unit cube, clamped on evaluation
struct UnitCube<'a> {
    problem: &'a dyn Problem,
}

impl UnitCube<'_> {
    fn to_params(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(self.problem.bounds())
            .map(|(u, &(min, max))| min + u.clamp(0.0, 1.0) * (max - min))
            .collect()
    }

    fn to_unit(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.problem.bounds())
            .map(|(p, &(min, max))| {
                if max > min { ((p - min) / (max - min)).clamp(0.0, 1.0) } else { 0.0 }
            })
            .collect()
    }
}

impl CostFunction for UnitCube<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, unit: &Self::Param) -> Result<Self::Output, ArgminError> {
        let mut params = self.to_params(unit);
        self.problem.apply_constraints(&mut params)?;
        Ok(self.problem.cost(&params)?)
    }
}

impl Gradient for UnitCube<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, unit: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        let params = self.to_params(unit);
        let grad = self.problem.gradient(&params)?;
        // Projected gradient: no pull across an active bound.
        Ok(grad
            .iter()
            .zip(unit)
            .zip(self.problem.bounds())
            .map(|((g, u), &(min, max))| {
                let g = g * (max - min);
                if (*u >= 1.0 && g < 0.0) || (*u <= 0.0 && g > 0.0) { 0.0 } else { g }
            })
            .collect())
    }
}

fn from_argmin(err: ArgminError) -> MagsafError {
    match err.downcast::<MagsafError>() {
        Ok(inner) => inner,
        Err(other) => MagsafError::Optimizer(other.to_string()),
    }
}

/// Local quasi-Newton refinement (BFGS, More-Thuente line search) inside the bounds
pub struct BoundedBfgs {
    max_iter: u64,
    tolerance_grad: f64,
    tolerance_cost: f64,
}

impl BoundedBfgs {
    pub fn new(max_iter: u64) -> Self {
        Self {
            max_iter,
            tolerance_grad: 1e-6,
            tolerance_cost: 1e-4,
        }
    }

    /// Configure stopping tolerances (defaults: gradient 1e-6, cost change 1e-4)
    pub fn with_tolerances(mut self, tolerance_grad: f64, tolerance_cost: f64) -> Self {
        self.tolerance_grad = tolerance_grad;
        self.tolerance_cost = tolerance_cost;
        self
    }
}

impl Solver for BoundedBfgs {
    fn name(&self) -> &str {
        "BFGS"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> MagsafResult<SolverResult> {
        let n = problem.num_params();
        let cube = UnitCube { problem };
        let start = cube.to_unit(problem.initial_params());
        let start_cost = cube.cost(&start).map_err(from_argmin)?;
        callback.on_iteration(0, &cube.to_params(&start), start_cost)?;

        let identity: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        let solver = BFGS::new(MoreThuenteLineSearch::new())
            .with_tolerance_grad(self.tolerance_grad)
            .map_err(from_argmin)?
            .with_tolerance_cost(self.tolerance_cost)
            .map_err(from_argmin)?;

        let result = Executor::new(cube, solver)
            .configure(|state| state.param(start).inv_hessian(identity).max_iters(self.max_iter))
            .run()
            .map_err(from_argmin)?;

        let state = result.state();
        let cube = UnitCube { problem };
        let best = state.get_best_param().cloned().unwrap_or_default();
        let (params, cost) = if best.len() == n && state.get_best_cost() <= start_cost {
            (cube.to_params(&best), state.get_best_cost())
        } else {
            (problem.initial_params().to_vec(), start_cost)
        };
        let status = state.get_termination_status();
        let success = matches!(
            status,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );
        let counts = state.get_func_counts();
        let iterations = state.get_iter() as u32;

        callback.on_iteration(iterations, &params, cost)?;

        Ok(SolverResult {
            success,
            cost,
            iterations,
            message: format!("{:?}", status),
            params,
            cost_evals: counts.get("cost_count").copied().unwrap_or(0) as usize + 1,
            grad_evals: counts.get("gradient_count").copied().unwrap_or(0) as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::solvers::tests::{Quadratic, Recorder};

    #[test]
    fn polishes_towards_interior_minimum() {
        let mut problem = Quadratic::new(vec![0.25, -0.5], vec![(-1.0, 1.0), (-1.0, 1.0)]);
        problem.initial = vec![0.6, 0.2];
        let result = BoundedBfgs::new(100)
            .with_tolerances(1e-8, 1e-12)
            .solve(&problem, &mut Recorder::default())
            .unwrap();
        assert!(result.cost < 1e-6, "cost {}", result.cost);
        assert!((result.params[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn stays_inside_bounds() {
        let mut problem = Quadratic::new(vec![3.0], vec![(-1.0, 1.0)]);
        problem.initial = vec![0.0];
        let result = BoundedBfgs::new(50).solve(&problem, &mut Recorder::default()).unwrap();
        assert!(result.params[0] <= 1.0);
        assert!(result.cost <= 9.0);
    }

    #[test]
    fn cancelled_cost_aborts_polish() {
        let mut problem = Quadratic::new(vec![0.0], vec![(-1.0, 1.0)]);
        problem.fail_after = Some(3);
        let err = BoundedBfgs::new(50).solve(&problem, &mut Recorder::default()).unwrap_err();
        assert!(err.is_cancelled());
    }
}
