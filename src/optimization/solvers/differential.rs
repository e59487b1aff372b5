use super::traits::{OptimizationCallback, Problem, Solver, SolverResult};
use crate::core::{MagsafError, MagsafResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Differential evolution (best/1/bin) over the unit cube spanned by the bounds
pub struct DifferentialEvolution {
    max_generations: u32,
    population_factor: usize,
    mutation: (f64, f64),   // dither range for the differential weight
    recombination: f64,     // binomial crossover probability
    tolerance: f64,         // relative spread of population costs
    seed: Option<u64>,
}

impl DifferentialEvolution {
    pub fn new(max_generations: u32, population_factor: usize) -> Self {
        Self {
            max_generations,
            population_factor,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            tolerance: 0.01,
            seed: None,
        }
    }

    /// Fix the random stream (default: seeded from entropy)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn population_size(&self, n_params: usize) -> usize {
        (self.population_factor * n_params).max(5)
    }

    #[inline]
    fn to_params(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
        unit.iter()
            .zip(bounds)
            .map(|(u, &(min, max))| min + u * (max - min))
            .collect()
    }

    #[inline]
    fn to_unit(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
        params
            .iter()
            .zip(bounds)
            .map(|(p, &(min, max))| {
                if max > min { ((p - min) / (max - min)).clamp(0.0, 1.0) } else { 0.5 }
            })
            .collect()
    }

    /// Latin hypercube start; the first member is the provided initial guess
    fn initialize_population(
        &self,
        rng: &mut StdRng,
        size: usize,
        bounds: &[(f64, f64)],
        initial_params: &[f64],
    ) -> Vec<Vec<f64>> {
        let n = bounds.len();
        let mut population = vec![vec![0.0; n]; size];
        let segment = 1.0 / size as f64;

        for i in 0..n {
            let mut strata: Vec<usize> = (0..size).collect();
            strata.shuffle(rng);
            for (member, &s) in population.iter_mut().zip(&strata) {
                member[i] = (s as f64 + rng.gen_range(0.0..1.0)) * segment;
            }
        }

        population[0] = Self::to_unit(initial_params, bounds);
        population
    }

    fn evaluate(
        problem: &dyn Problem,
        unit: &[f64],
        bounds: &[(f64, f64)],
        cost_evals: &mut usize,
    ) -> MagsafResult<f64> {
        let mut params = Self::to_params(unit, bounds);
        problem.apply_constraints(&mut params)?;
        let cost = problem.cost(&params)?;
        *cost_evals += 1;
        Ok(if cost.is_nan() { f64::INFINITY } else { cost })
    }

    fn converged(&self, costs: &[f64]) -> bool {
        let n = costs.len() as f64;
        let mean = costs.iter().sum::<f64>() / n;
        let var = costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        var.is_finite() && var.sqrt() <= self.tolerance * mean.abs()
    }
}

impl Solver for DifferentialEvolution {
    fn name(&self) -> &str {
        "DifferentialEvolution"
    }

    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> MagsafResult<SolverResult> {
        let n = problem.num_params();
        if n == 0 {
            return Err(MagsafError::invalid("no parameter to optimize"));
        }
        let bounds = problem.bounds();
        let size = self.population_size(n);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut population =
            self.initialize_population(&mut rng, size, bounds, problem.initial_params());
        let mut cost_evals = 0;
        let mut costs = Vec::with_capacity(size);
        for member in &population {
            costs.push(Self::evaluate(problem, member, bounds, &mut cost_evals)?);
        }
        let mut best = best_index(&costs);

        for generation in 0..self.max_generations {
            let weight = rng.gen_range(self.mutation.0..self.mutation.1);

            for target in 0..size {
                let (r1, r2) = pick_two(&mut rng, size, target);
                let forced = rng.gen_range(0..n);
                let mut trial = population[target].clone();
                for i in 0..n {
                    if i == forced || rng.gen_range(0.0..1.0) < self.recombination {
                        trial[i] = population[best][i]
                            + weight * (population[r1][i] - population[r2][i]);
                    }
                }
                // Leaving the cube restarts the coordinate uniformly.
                for value in trial.iter_mut() {
                    if !(0.0..=1.0).contains(&*value) {
                        *value = rng.gen_range(0.0..1.0);
                    }
                }

                let cost = Self::evaluate(problem, &trial, bounds, &mut cost_evals)?;
                if cost <= costs[target] {
                    population[target] = trial;
                    costs[target] = cost;
                    if cost <= costs[best] {
                        best = target;
                    }
                }
            }

            let params = Self::to_params(&population[best], bounds);
            callback.on_iteration(generation + 1, &params, costs[best])?;

            if callback.should_stop() {
                return Ok(SolverResult {
                    success: false,
                    cost: costs[best],
                    iterations: generation + 1,
                    message: "Stopped by callback".into(),
                    params,
                    cost_evals,
                    grad_evals: 0,
                });
            }

            if self.converged(&costs) {
                return Ok(SolverResult {
                    success: true,
                    cost: costs[best],
                    iterations: generation + 1,
                    message: "Optimization terminated successfully.".into(),
                    params,
                    cost_evals,
                    grad_evals: 0,
                });
            }
        }

        Ok(SolverResult {
            success: false,
            cost: costs[best],
            iterations: self.max_generations,
            message: "Maximum number of iterations has been exceeded.".into(),
            params: Self::to_params(&population[best], bounds),
            cost_evals,
            grad_evals: 0,
        })
    }
}

fn best_index(costs: &[f64]) -> usize {
    costs
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

/// Two distinct members, both different from `exclude`.
fn pick_two(rng: &mut StdRng, size: usize, exclude: usize) -> (usize, usize) {
    let mut r1 = rng.gen_range(0..size);
    while r1 == exclude {
        r1 = rng.gen_range(0..size);
    }
    let mut r2 = rng.gen_range(0..size);
    while r2 == exclude || r2 == r1 {
        r2 = rng.gen_range(0..size);
    }
    (r1, r2)
}
