//! Field sweeps and branch reconstruction.

use crate::core::normalize_radian;
use std::f64::consts::PI;

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Sweep from `+h_max` down to `-h_max` with about `h_step` spacing, optionally back up.
pub fn simulation_sweep(h_max: f64, h_step: f64, full_hysteresis: bool) -> Vec<f64> {
    if !(h_max > 0.0 && h_step > 0.0) {
        return Vec::new();
    }
    let n = (2.0 * h_max / h_step).floor() as usize;
    let mut sweep = linspace(h_max, -h_max, n);
    if full_hysteresis {
        sweep.extend(linspace(-h_max, h_max, n));
    }
    sweep
}

/// Index of the (first) most negative field: end of the descending branch.
pub fn half_sweep_index(sweep: &[f64]) -> Option<usize> {
    sweep
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &h)| match best {
            Some((_, min)) if h >= min => best,
            _ => Some((i, h)),
        })
        .map(|(i, _)| i)
}

/// Point reflection of a descending branch: `H -> -H`, `M -> -M`, `phi -> phi + π`.
pub fn reflect_field(h: &[f64]) -> Vec<f64> {
    h.iter().map(|x| -x).collect()
}

pub fn reflect_moment(m: &[f64]) -> Vec<f64> {
    m.iter().map(|x| -x).collect()
}

pub fn reflect_angles(phi: &[f64]) -> Vec<f64> {
    phi.iter().map(|p| normalize_radian(p + PI)).collect()
}

/// Sample pairs sorted by abscissa; descending or unsorted input is accepted.
fn sorted_samples(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    let mut samples: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    if !samples.windows(2).all(|w| w[0].0 <= w[1].0) {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    samples
}

/// Locate `x` between two samples, clamping to the end values outside the range.
fn bracket(samples: &[(f64, f64)], x: f64) -> Option<((f64, f64), (f64, f64), f64)> {
    let first = *samples.first()?;
    let last = *samples.last()?;
    if x <= first.0 {
        return Some((first, first, 0.0));
    }
    if x >= last.0 {
        return Some((last, last, 0.0));
    }
    let upper = samples.partition_point(|s| s.0 <= x);
    let (lo, hi) = (samples[upper - 1], samples[upper]);
    let t = if hi.0 > lo.0 { (x - lo.0) / (hi.0 - lo.0) } else { 0.0 };
    Some((lo, hi, t))
}

/// Piecewise-linear interpolation of `ys(xs)` at every point of `at`.
pub fn interpolate(at: &[f64], xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let samples = sorted_samples(xs, ys);
    at.iter()
        .map(|&x| match bracket(&samples, x) {
            Some((lo, hi, t)) => lo.1 + t * (hi.1 - lo.1),
            None => f64::NAN,
        })
        .collect()
}

/// Like [`interpolate`] but along the shorter arc between neighbouring angles.
pub fn interpolate_angles(at: &[f64], xs: &[f64], phis: &[f64]) -> Vec<f64> {
    let samples = sorted_samples(xs, phis);
    at.iter()
        .map(|&x| match bracket(&samples, x) {
            Some((lo, hi, t)) => normalize_radian(lo.1 + t * normalize_radian(hi.1 - lo.1)),
            None => f64::NAN,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_counts_follow_step() {
        let sweep = simulation_sweep(1.0, 2.5e-3, false);
        assert_eq!(sweep.len(), 800);
        assert_eq!(sweep[0], 1.0);
        assert_eq!(*sweep.last().unwrap(), -1.0);

        let full = simulation_sweep(1.0, 2.5e-3, true);
        assert_eq!(full.len(), 1600);
        assert_eq!(half_sweep_index(&full), Some(799));
    }

    #[test]
    fn half_index_takes_first_minimum() {
        assert_eq!(half_sweep_index(&[0.3, -0.2, -0.5, -0.5, 0.1]), Some(2));
        assert_eq!(half_sweep_index(&[]), None);
    }

    #[test]
    fn interpolation_clamps_and_handles_descending_input() {
        let xs = [1.0, 0.0, -1.0];
        let ys = [10.0, 0.0, -10.0];
        let out = interpolate(&[0.5, -2.0, 2.0], &xs, &ys);
        assert_eq!(out, vec![5.0, -10.0, 10.0]);
    }

    #[test]
    fn angle_interpolation_takes_short_arc() {
        let xs = [0.0, 1.0];
        let phis = [PI - 0.1, -PI + 0.1];
        let mid = interpolate_angles(&[0.5], &xs, &phis)[0];
        assert!((mid.abs() - PI).abs() < 1e-12);
    }
}
