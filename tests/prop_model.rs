//! Property-based checks of the energy model, the sweep mirroring and the figure of merit.

use magsaf::core::{normalize_radian, SafParams};
use magsaf::data::ExperimentalData;
use magsaf::model::{
    effective_field_direction, simulation_sweep, EnergyLandscape, EquilibriumSolver,
};
use magsaf::optimization::{channel_fom, FomSettings};
use magsaf::{HysteresisSimulator, MacrospinModel};
use proptest::prelude::*;
use std::f64::consts::PI;

fn saf(dms_a: f64, dms_b: f64, hani: f64, j1: f64, j2: f64, phi_h: f64) -> SafParams {
    SafParams::from_vector(&[dms_a, hani, PI / 2.0, j1, j2, dms_b, hani, PI / 2.0], vec![phi_h])
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn normalized_angles_stay_in_half_open_interval(phi in -50.0f64..50.0) {
        let p = normalize_radian(phi);
        prop_assert!(p > -PI && p <= PI, "{} -> {}", phi, p);
        let turns = (phi - p) / (2.0 * PI);
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }

    #[test]
    fn field_direction_flips_only_for_negative_fields(h in -1.0f64..1.0, phi_h in -3.0f64..3.0) {
        let eff = effective_field_direction(h, phi_h);
        if h < 0.0 {
            prop_assert!((normalize_radian(eff - phi_h).abs() - PI).abs() < 1e-12);
        } else {
            prop_assert_eq!(eff, phi_h);
        }
    }

    #[test]
    fn identical_data_scores_zero(
        m in prop::collection::vec(prop_oneof![-1e-2f64..-1e-5, 1e-5f64..1e-2], 3..40)
    ) {
        let n = m.len();
        let h: Vec<f64> = (0..n).map(|i| 1.0 - 2.0 * i as f64 / (n - 1) as f64).collect();
        let data = ExperimentalData::new(h, m.clone()).unwrap();
        let fom = channel_fom(&m, &data, &FomSettings::default()).unwrap();
        prop_assert!(fom.abs() < 1e-15);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn equilibria_are_local_minima(
        dms_a in 2e-3f64..1e-2,
        dms_b in 2e-3f64..1e-2,
        hani in 0.0f64..0.05,
        j1 in -1.5e-3f64..-1e-4,
        j2 in -4e-4f64..0.0,
        h in -1.0f64..1.0,
        guess_a in -3.0f64..3.0,
        guess_b in -3.0f64..3.0,
    ) {
        let params = saf(dms_a, dms_b, hani, j1, j2, 0.0);
        let solver = EquilibriumSolver::new(EnergyLandscape::new(&params));
        let eq = solver.solve((guess_a, guess_b), h, effective_field_direction(h, 0.0));
        prop_assume!(!eq.stagnated);
        prop_assert!(eq.gradient_norm < 1e-6, "gradient {}", eq.gradient_norm);
        prop_assert!(eq.is_minimum(), "{:?}", eq.curvature);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn mirrored_branch_is_point_reflection(
        j1 in -1.2e-3f64..-2e-4,
        j2 in -3e-4f64..0.0,
        hani in 0.0f64..0.02,
        phi_h in -1.5f64..1.5,
    ) {
        let model = MacrospinModel::new(saf(6e-3, 5e-3, hani, j1, j2, phi_h)).unwrap();
        let sweep = simulation_sweep(0.8, 0.04, false);
        let curve = HysteresisSimulator::new(&model).simulate(&sweep).completed().unwrap();
        let c = &curve.channels[0];
        let n = sweep.len();
        prop_assert_eq!(c.len(), 2 * n);
        for i in 0..n {
            prop_assert_eq!(c.h[n + i], -c.h[i]);
            prop_assert_eq!(c.m[n + i], -c.m[i]);
            prop_assert!((normalize_radian(c.phi_a[n + i] - c.phi_a[i] - PI)).abs() < 1e-12);
            prop_assert!((normalize_radian(c.phi_b[n + i] - c.phi_b[i] - PI)).abs() < 1e-12);
        }
    }
}
