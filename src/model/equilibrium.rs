use super::landscape::{Curvature, EnergyLandscape, EnergyPoint, PointKind};
use crate::core::normalize_radian;
use log::{debug, warn};
use std::f64::consts::PI;

const ONE_DEGREE: f64 = PI / 180.0;

/// Compass offsets probed around a stuck point, in units of the current increment.
const COMPASS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (0.0, 1.0),
    (-1.0, 0.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
    (-1.0, 1.0),
];

/// Equilibrium angles for one field value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Equilibrium {
    pub phi_a: f64,
    pub phi_b: f64,
    pub energy: f64,
    pub gradient_norm: f64,
    pub curvature: Curvature,
    /// Gradient tolerance reached.
    pub converged: bool,
    /// Result came from the saddle/maximum escape.
    pub escaped: bool,
    /// Escape budget exhausted; best candidate returned.
    pub stagnated: bool,
    pub iterations: u32,
}

impl Equilibrium {
    pub fn is_minimum(&self) -> bool {
        self.curvature.is_stable()
    }
}

/// Outcome of one local Newton run.
#[derive(Clone, Copy, Debug)]
struct LocalMinimum {
    point: [f64; 2],
    value: EnergyPoint,
    curvature: Curvature,
    converged: bool,
    iterations: u32,
}

/// Damped Newton minimizer with analytic Hessian and saddle-point escape
pub struct EquilibriumSolver<'a> {
    landscape: EnergyLandscape<'a>,
    gradient_tolerance: f64,
    acceptance_tolerance: f64,
    max_iter: u32,
    stuck_tolerance: f64,
    escape_increment: f64,
    max_escape_rings: u32,
    max_step: f64,
    armijo_c: f64,         // Armijo condition parameter
    backtrack_factor: f64, // Line search backtracking
    min_step: f64,
}

impl<'a> EquilibriumSolver<'a> {
    pub fn new(landscape: EnergyLandscape<'a>) -> Self {
        Self {
            landscape,
            gradient_tolerance: 1e-12,
            acceptance_tolerance: 1e-8,
            max_iter: 200,
            stuck_tolerance: 1e-2,
            escape_increment: ONE_DEGREE,
            max_escape_rings: 30,
            max_step: 0.5,
            armijo_c: 1e-4,
            backtrack_factor: 0.5,
            min_step: 1e-10,
        }
    }

    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    /// Configure the escape budget (default: 30 rings of 1° each)
    pub fn with_escape_rings(mut self, rings: u32) -> Self {
        self.max_escape_rings = rings;
        self
    }

    pub fn gradient_tolerance(&self) -> f64 {
        self.gradient_tolerance
    }

    /// Nearest local energy minimum from `guess` at field `h` pointing along `phi_h_eff`.
    pub fn solve(&self, guess: (f64, f64), h: f64, phi_h_eff: f64) -> Equilibrium {
        let start = [guess.0, guess.1];
        let first = self.minimize(start, h, phi_h_eff);

        if first.curvature.is_stable() {
            return self.finish(first, false, false);
        }

        // Stuck on the seed means the seed itself is the saddle/maximum; otherwise
        // Newton slid onto one and we probe around where it ended.
        let stuck = (first.point[0] - start[0]).abs() < self.stuck_tolerance
            && (first.point[1] - start[1]).abs() < self.stuck_tolerance;
        let center = if stuck { start } else { first.point };
        debug!(
            "h = {:.6e} T: stationary point ({:.4}, {:.4}) is {:?}, probing neighbours",
            h,
            center[0],
            center[1],
            first.curvature.kind()
        );

        self.escape(center, first, h, phi_h_eff)
    }

    /// Probe 8 compass neighbours at growing increments until one relaxes into a minimum.
    fn escape(&self, center: [f64; 2], first: LocalMinimum, h: f64, phi_h_eff: f64) -> Equilibrium {
        let mut best = first;
        let mut increment = self.escape_increment;

        for _ in 0..self.max_escape_rings {
            for (da, db) in COMPASS {
                let guess = [center[0] + da * increment, center[1] + db * increment];
                let candidate = self.minimize(guess, h, phi_h_eff);

                if candidate.value.gradient_norm() < self.acceptance_tolerance
                    && candidate.curvature.is_stable()
                {
                    return self.finish(candidate, true, false);
                }
                if candidate.value.gradient_norm() < best.value.gradient_norm() {
                    best = candidate;
                }
            }
            increment += self.escape_increment;
        }

        warn!(
            "h = {:.6e} T: no minimum within {} escape rings, kept ({:.4}, {:.4}), |grad| {:.3e}",
            h,
            self.max_escape_rings,
            best.point[0],
            best.point[1],
            best.value.gradient_norm()
        );
        self.finish(best, true, true)
    }

    fn finish(&self, local: LocalMinimum, escaped: bool, stagnated: bool) -> Equilibrium {
        Equilibrium {
            phi_a: normalize_radian(local.point[0]),
            phi_b: normalize_radian(local.point[1]),
            energy: local.value.energy,
            gradient_norm: local.value.gradient_norm(),
            curvature: local.curvature,
            converged: local.converged,
            escaped,
            stagnated,
            iterations: local.iterations,
        }
    }

    /// Newton direction; the Hessian is shifted to positive definite where it is not.
    fn newton_direction(&self, gradient: [f64; 2], curvature: &Curvature) -> [f64; 2] {
        let [[a, b], [_, d]] = curvature.hessian;
        let mean = 0.5 * (a + d);
        let radius = (0.25 * (a - d).powi(2) + b * b).sqrt();
        let lambda_min = mean - radius;

        let shift = if lambda_min > 0.0 {
            0.0
        } else {
            // Keep the shifted matrix comfortably positive definite.
            -lambda_min + (radius + mean.abs()).max(1.0) * 1e-3
        };
        let (a, d) = (a + shift, d + shift);
        let det = a * d - b * b;
        if det <= 0.0 || !det.is_finite() {
            return [-gradient[0], -gradient[1]];
        }

        let mut dir = [
            -(d * gradient[0] - b * gradient[1]) / det,
            -(-b * gradient[0] + a * gradient[1]) / det,
        ];
        let largest = dir[0].abs().max(dir[1].abs());
        if largest > self.max_step {
            dir[0] *= self.max_step / largest;
            dir[1] *= self.max_step / largest;
        }
        dir
    }

    /// Damped Newton iteration with Armijo backtracking.
    fn minimize(&self, start: [f64; 2], h: f64, phi_h_eff: f64) -> LocalMinimum {
        let land = &self.landscape;
        let mut x = start;
        let mut value = land.energy(x[0], x[1], h, phi_h_eff);
        let mut curvature = land.hessian(x[0], x[1], h, phi_h_eff);

        for iter in 0..self.max_iter {
            if value.gradient_norm() < self.gradient_tolerance {
                return LocalMinimum {
                    point: x,
                    value,
                    curvature,
                    converged: true,
                    iterations: iter,
                };
            }

            let dir = self.newton_direction(value.gradient, &curvature);
            let slope = value.gradient[0] * dir[0] + value.gradient[1] * dir[1];
            let convex = curvature.kind() == PointKind::Minimum;

            let mut alpha = 1.0;
            let mut accepted = None;
            while alpha >= self.min_step {
                let trial = [x[0] + alpha * dir[0], x[1] + alpha * dir[1]];
                let trial_value = land.energy(trial[0], trial[1], h, phi_h_eff);

                // Armijo condition: sufficient decrease
                if trial_value.energy <= value.energy + self.armijo_c * alpha * slope {
                    accepted = Some((trial, trial_value));
                    break;
                }
                // Near convergence the energy change drops below rounding; a full
                // step that shrinks the gradient is still progress.
                if convex && alpha == 1.0 && trial_value.gradient_norm() < value.gradient_norm() {
                    accepted = Some((trial, trial_value));
                    break;
                }
                alpha *= self.backtrack_factor;
            }

            match accepted {
                Some((trial, trial_value)) => {
                    x = trial;
                    value = trial_value;
                    curvature = land.hessian(x[0], x[1], h, phi_h_eff);
                }
                None => {
                    return LocalMinimum {
                        point: x,
                        value,
                        curvature,
                        converged: value.gradient_norm() < self.gradient_tolerance,
                        iterations: iter + 1,
                    };
                }
            }
        }

        LocalMinimum {
            point: x,
            value,
            curvature,
            converged: value.gradient_norm() < self.gradient_tolerance,
            iterations: self.max_iter,
        }
    }
}
