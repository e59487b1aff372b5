use crate::core::MagsafResult;

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub params: Vec<f64>,
    pub cost_evals: usize,
    pub grad_evals: usize,
}

/// Callback interface for optimization progress
pub trait OptimizationCallback {
    /// Called once per solver iteration with the best parameters so far and their cost
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> MagsafResult<()>;

    /// Check if optimization should stop early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Bounded minimization problem over the fitted parameters
pub trait Problem {
    /// Evaluate cost for given parameters (runs a full hysteresis simulation)
    fn cost(&self, params: &[f64]) -> MagsafResult<f64>;

    /// Number of parameters
    fn num_params(&self) -> usize;

    /// Initial parameter values
    fn initial_params(&self) -> &[f64];

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];

    /// Project a trial point onto the feasible set (modifies params in place)
    fn apply_constraints(&self, params: &mut [f64]) -> MagsafResult<()> {
        clamp_to_bounds(params, self.bounds());
        Ok(())
    }

    /// Central finite-difference gradient, steps relative to each parameter's range
    fn gradient(&self, params: &[f64]) -> MagsafResult<Vec<f64>> {
        let bounds = self.bounds();
        let mut grad = vec![0.0; params.len()];

        for i in 0..params.len() {
            let (min, max) = bounds[i];
            let h = 1e-6 * (max - min).abs().max(f64::EPSILON);
            let mut p_plus = params.to_vec();
            let mut p_minus = params.to_vec();
            p_plus[i] = (params[i] + h).min(max);
            p_minus[i] = (params[i] - h).max(min);

            let span = p_plus[i] - p_minus[i];
            if span <= 0.0 {
                continue;
            }
            grad[i] = (self.cost(&p_plus)? - self.cost(&p_minus)?) / span;
        }

        Ok(grad)
    }
}

/// Solver interface - takes problem and callback
pub trait Solver {
    fn name(&self) -> &str;

    /// Solve the optimization problem with callback for progress tracking
    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> MagsafResult<SolverResult>;
}

#[inline]
pub fn clamp_to_bounds(params: &mut [f64], bounds: &[(f64, f64)]) {
    for (p, &(min, max)) in params.iter_mut().zip(bounds) {
        *p = p.clamp(min, max);
    }
}
