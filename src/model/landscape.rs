//! Reduced free energy of two coupled macrospins.
//!
//! Each layer carries a Zeeman term `-dMs·|h|·cos(phi - phiH)` and a uniaxial
//! anisotropy term `-0.5·dMs·Hani·cos²(phi - phiani)`; the layers couple through
//! `-J1·cos(phiA - phiB) - J2·cos²(phiA - phiB)`. Energy, gradient and Hessian are
//! divided by the same scale so the minimizer sees O(1) numbers in any unit system.

use crate::core::{normalize_radian, SafParams};
use std::f64::consts::PI;

/// Energy and gradient at one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyPoint {
    pub energy: f64,
    pub gradient: [f64; 2],
}

impl EnergyPoint {
    pub fn gradient_norm(&self) -> f64 {
        self.gradient[0].abs().max(self.gradient[1].abs())
    }
}

/// Second derivatives at one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Curvature {
    pub hessian: [[f64; 2]; 2],
    pub det: f64,
}

/// Stationary-point type from the 2x2 second-derivative test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointKind {
    Minimum,
    Maximum,
    Saddle,
    /// Determinant numerically zero, e.g. a rotation-invariant valley.
    Flat,
}

impl Curvature {
    /// Relative determinant threshold below which the test is inconclusive.
    const FLAT_TOLERANCE: f64 = 1e-10;

    pub fn trace(&self) -> f64 {
        self.hessian[0][0] + self.hessian[1][1]
    }

    pub fn kind(&self) -> PointKind {
        let scale = self.trace().powi(2).max(f64::MIN_POSITIVE);
        if self.det.abs() <= Self::FLAT_TOLERANCE * scale {
            PointKind::Flat
        } else if self.det < 0.0 {
            PointKind::Saddle
        } else if self.hessian[0][0] > 0.0 {
            PointKind::Minimum
        } else {
            PointKind::Maximum
        }
    }

    /// Minimum, or a flat valley that curves upward along the trace.
    pub fn is_stable(&self) -> bool {
        match self.kind() {
            PointKind::Minimum => true,
            PointKind::Flat => self.trace() > 0.0,
            _ => false,
        }
    }
}

/// Direction the field actually points: flipped by π for negative magnitudes.
#[inline]
pub fn effective_field_direction(h: f64, phi_h: f64) -> f64 {
    if h < 0.0 {
        normalize_radian(phi_h + PI)
    } else {
        phi_h
    }
}

/// Pure energy functional for one parameter set.
#[derive(Clone, Copy, Debug)]
pub struct EnergyLandscape<'a> {
    params: &'a SafParams,
}

impl<'a> EnergyLandscape<'a> {
    pub fn new(params: &'a SafParams) -> Self {
        Self { params }
    }

    /// Sum of the largest Zeeman+anisotropy magnitudes of both layers plus the coupling magnitudes.
    pub fn scale(&self, h: f64) -> f64 {
        let p = self.params;
        let h = h.abs();
        let scale = p.dms_a * (h + 0.5 * p.hani_a.abs())
            + p.dms_b * (h + 0.5 * p.hani_b.abs())
            + p.j1.abs()
            + p.j2.abs();
        if scale > 0.0 { scale } else { 1.0 }
    }

    /// Normalized energy and gradient; `phi_h_eff` is already flipped for negative fields.
    pub fn energy(&self, phi_a: f64, phi_b: f64, h: f64, phi_h_eff: f64) -> EnergyPoint {
        let p = self.params;
        let h = h.abs();
        let s = self.scale(h);
        let dab = phi_a - phi_b;

        let g_a = -p.dms_a
            * (h * (phi_a - phi_h_eff).cos() + 0.5 * p.hani_a * (phi_a - p.phiani_a).cos().powi(2));
        let g_b = -p.dms_b
            * (h * (phi_b - phi_h_eff).cos() + 0.5 * p.hani_b * (phi_b - p.phiani_b).cos().powi(2));
        let g_rkky = -(p.j1 * dab.cos() + p.j2 * dab.cos().powi(2));

        let coupling = p.j1 * dab.sin() + p.j2 * (2.0 * dab).sin();
        let dg_a = p.dms_a
            * (h * (phi_a - phi_h_eff).sin() + 0.5 * p.hani_a * (2.0 * (phi_a - p.phiani_a)).sin())
            + coupling;
        let dg_b = p.dms_b
            * (h * (phi_b - phi_h_eff).sin() + 0.5 * p.hani_b * (2.0 * (phi_b - p.phiani_b)).sin())
            - coupling;

        EnergyPoint {
            energy: (g_a + g_b + g_rkky) / s,
            gradient: [dg_a / s, dg_b / s],
        }
    }

    /// Normalized analytic Hessian and its determinant.
    pub fn hessian(&self, phi_a: f64, phi_b: f64, h: f64, phi_h_eff: f64) -> Curvature {
        let p = self.params;
        let h = h.abs();
        let s = self.scale(h);
        let dab = phi_a - phi_b;

        let coupling = p.j1 * dab.cos() + 2.0 * p.j2 * (2.0 * dab).cos();
        let h_aa = p.dms_a
            * (h * (phi_a - phi_h_eff).cos() + p.hani_a * (2.0 * (phi_a - p.phiani_a)).cos())
            + coupling;
        let h_bb = p.dms_b
            * (h * (phi_b - phi_h_eff).cos() + p.hani_b * (2.0 * (phi_b - p.phiani_b)).cos())
            + coupling;
        let h_ab = -coupling;

        let hessian = [[h_aa / s, h_ab / s], [h_ab / s, h_bb / s]];
        let det = hessian[0][0] * hessian[1][1] - hessian[0][1] * hessian[1][0];
        Curvature { hessian, det }
    }

    /// Energy on an `n x n` grid over [-π, π]²; rows run over `phi_a`, columns over `phi_b`.
    pub fn map(&self, h: f64, phi_h: f64, n: usize) -> Vec<Vec<f64>> {
        let phi_h_eff = effective_field_direction(h, phi_h);
        let axis = angle_axis(n);
        axis.iter()
            .map(|&phi_a| {
                axis.iter()
                    .map(|&phi_b| self.energy(phi_a, phi_b, h, phi_h_eff).energy)
                    .collect()
            })
            .collect()
    }
}

/// `n` evenly spaced angles from -π to π inclusive.
pub fn angle_axis(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![-PI],
        _ => (0..n)
            .map(|i| -PI + 2.0 * PI * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SafParams {
        SafParams::from_vector(
            &[5e-3, 20e-3, 0.3, -0.8e-3, -0.2e-3, 3e-3, 10e-3, -0.4],
            vec![0.2],
        )
        .unwrap()
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let p = params();
        let land = EnergyLandscape::new(&p);
        let (a, b, h, ph) = (0.7, -1.9, 0.05, 0.2);
        let eps = 1e-6;
        let g = land.energy(a, b, h, ph);
        let da = (land.energy(a + eps, b, h, ph).energy - land.energy(a - eps, b, h, ph).energy)
            / (2.0 * eps);
        let db = (land.energy(a, b + eps, h, ph).energy - land.energy(a, b - eps, h, ph).energy)
            / (2.0 * eps);
        assert!((g.gradient[0] - da).abs() < 1e-7);
        assert!((g.gradient[1] - db).abs() < 1e-7);
    }

    #[test]
    fn hessian_matches_finite_difference() {
        let p = params();
        let land = EnergyLandscape::new(&p);
        let (a, b, h, ph) = (0.4, 2.2, 0.12, 0.2);
        let eps = 1e-6;
        let c = land.hessian(a, b, h, ph);
        let ga_p = land.energy(a + eps, b, h, ph).gradient;
        let ga_m = land.energy(a - eps, b, h, ph).gradient;
        let gb_p = land.energy(a, b + eps, h, ph).gradient;
        let gb_m = land.energy(a, b - eps, h, ph).gradient;
        assert!((c.hessian[0][0] - (ga_p[0] - ga_m[0]) / (2.0 * eps)).abs() < 1e-6);
        assert!((c.hessian[1][0] - (ga_p[1] - ga_m[1]) / (2.0 * eps)).abs() < 1e-6);
        assert!((c.hessian[0][1] - (gb_p[0] - gb_m[0]) / (2.0 * eps)).abs() < 1e-6);
        assert!((c.hessian[1][1] - (gb_p[1] - gb_m[1]) / (2.0 * eps)).abs() < 1e-6);
    }

    #[test]
    fn saturated_state_is_minimum_at_high_field() {
        let p = params();
        let land = EnergyLandscape::new(&p);
        let g = land.energy(0.2, 0.2, 5.0, 0.2);
        let c = land.hessian(0.2, 0.2, 5.0, 0.2);
        assert!(g.gradient_norm() < 1e-2);
        assert_eq!(c.kind(), PointKind::Minimum);
    }

    #[test]
    fn negative_field_flips_direction() {
        assert_eq!(effective_field_direction(0.1, 0.3), 0.3);
        assert!((effective_field_direction(-0.1, 0.0) - PI).abs() < 1e-15);
        assert!((effective_field_direction(-0.1, PI / 2.0) + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn map_has_requested_shape() {
        let p = params();
        let grid = EnergyLandscape::new(&p).map(0.01, 0.0, 12);
        assert_eq!(grid.len(), 12);
        assert!(grid.iter().all(|row| row.len() == 12));
        assert_eq!(angle_axis(3), vec![-PI, 0.0, PI]);
    }
}
