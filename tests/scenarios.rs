//! End-to-end runs: loop symmetry, degeneracy handling, fitting and the job runner.

use magsaf::core::{normalize_radian, ParamId, ParameterStore, SafParams, DEGENERACY_OFFSET};
use magsaf::data::{to_table, DatasetSet, ExperimentalData, ExportKind};
use magsaf::job::{FitJob, JobEvent, JobOutput, JobRunner, SimulationJob};
use magsaf::model::{simulation_sweep, CancelToken, NullObserver, SweepMode};
use magsaf::optimization::{figure_of_merit, FitEngine, FitRequest, FomSettings};
use magsaf::{FitPrecision, HysteresisSimulator, MacrospinModel, RunSettings};
use std::f64::consts::PI;

fn reference_saf() -> SafParams {
    SafParams::from_vector(
        &[6.25e-3, 0.0, PI / 2.0, -0.75e-3, -0.25e-3, 6.25e-3, 0.0, PI / 2.0],
        vec![0.0],
    )
    .unwrap()
}

fn asymmetric_saf() -> SafParams {
    SafParams::from_vector(
        &[6.0e-3, 0.0, PI / 2.0, -0.8e-3, -0.2e-3, 4.0e-3, 0.0, PI / 2.0],
        vec![0.0],
    )
    .unwrap()
}

fn synthetic_data(params: SafParams) -> ExperimentalData {
    let model = MacrospinModel::new(params).unwrap();
    let curve = HysteresisSimulator::new(&model)
        .simulate(&simulation_sweep(0.6, 0.02, false))
        .completed()
        .unwrap();
    let c = &curve.channels[0];
    ExperimentalData::new(c.h.clone(), c.m.clone()).unwrap()
}

#[test]
fn antiferromagnetic_loop_is_symmetric() {
    let model = MacrospinModel::new(reference_saf()).unwrap();
    let sweep = simulation_sweep(1.0, 2.5e-3, false);
    let curve = HysteresisSimulator::new(&model).simulate(&sweep).completed().unwrap();
    let c = &curve.channels[0];
    let n = sweep.len();

    // Saturated at both ends along the field.
    assert!((c.m[0] - 12.5e-3).abs() < 1e-6);
    assert!(normalize_radian(c.phi_a[0]).abs() < 1e-3);
    assert!(normalize_radian(c.phi_b[0]).abs() < 1e-3);
    assert!((c.m[n - 1] + 12.5e-3).abs() < 1e-6);

    // Descending branch is odd in H: M(-H) = -M(H) for the field values shared by both halves.
    for i in 0..n / 2 {
        let j = n - 1 - i;
        assert!((c.h[i] + c.h[j]).abs() < 1e-9);
        assert!((c.m[i] + c.m[j]).abs() < 1e-6, "H = {}: {} vs {}", c.h[i], c.m[i], c.m[j]);
    }
    assert_eq!(curve.stats.stagnated, 0);
}

#[test]
fn simulation_is_deterministic() {
    let model = MacrospinModel::new(asymmetric_saf()).unwrap();
    let sweep = simulation_sweep(0.5, 0.01, true);
    let sim = HysteresisSimulator::new(&model).with_mode(SweepMode::Full);
    let first = sim.simulate(&sweep).completed().unwrap();
    let second = sim.simulate(&sweep).completed().unwrap();
    assert_eq!(first, second);
}

#[test]
fn identical_layers_get_perturbed_anisotropy() {
    let mut params = reference_saf();
    params.hani_a = 0.05;
    params.hani_b = 0.05;
    let model = MacrospinModel::new(params.clone()).unwrap();
    assert!(model.degeneracy_broken());
    assert!((model.params().phiani_a - params.phiani_a - DEGENERACY_OFFSET).abs() < 1e-15);
    assert_eq!(model.params().phiani_b, params.phiani_b);

    let sweep = simulation_sweep(0.6, 0.005, false);
    let curve = HysteresisSimulator::new(&model).simulate(&sweep).completed().unwrap();
    let c = &curve.channels[0];
    assert!(c.m.iter().all(|v| v.is_finite()));

    // No branch hopping: steps above 10 % of the total moment form at most one switching
    // pair, placed symmetrically about zero field.
    let jumps: Vec<f64> = c
        .m
        .windows(2)
        .zip(c.h.windows(2))
        .filter(|(m, _)| (m[1] - m[0]).abs() > 0.1 * 12.5e-3)
        .map(|(_, h)| 0.5 * (h[0] + h[1]))
        .collect();
    assert!(jumps.len() <= 2, "jumps at {:?}", jumps);
    if let [first, second] = jumps[..] {
        assert!((first + second).abs() < 1e-9, "jumps at {:?}", jumps);
    }
}

#[test]
fn fit_lowers_the_figure_of_merit() {
    let truth = asymmetric_saf();
    let data = vec![synthetic_data(truth.clone())];

    let mut store = ParameterStore::from_params(&truth);
    store.set_value(ParamId::J1, -1.6);
    store.set_bounds(ParamId::J1, -2.0, -0.1).unwrap();
    store.set_fit(ParamId::J1, true).unwrap();

    let start = store.to_params().unwrap();
    let start_model = MacrospinModel::new(start).unwrap();
    let start_curve = HysteresisSimulator::new(&start_model)
        .simulate_channels(&[data[0].h.clone()])
        .unwrap()
        .completed()
        .unwrap();
    let start_fom = figure_of_merit(&start_curve, &data, &FomSettings::default()).unwrap();

    let request =
        FitRequest::from_store(&store, &data, SweepMode::HalfMirror, FomSettings::default())
            .unwrap();
    let fit = FitEngine::new(FitPrecision::Fast)
        .with_seed(11)
        .fit_hysteresis(request, &CancelToken::new(), &NullObserver)
        .unwrap()
        .fitted()
        .unwrap();

    assert!(fit.fom < start_fom, "{} !< {}", fit.fom, start_fom);
    assert_eq!(fit.ids, vec![ParamId::J1]);

    store.write_back(&fit.params, &fit.ids);
    let fitted = store.value(ParamId::J1).unwrap();
    assert!((-2.0..=-0.1).contains(&fitted));
}

#[test]
fn fit_against_descending_branch_only() {
    let truth = asymmetric_saf();
    let model = MacrospinModel::new(truth.clone()).unwrap();
    let sweep = simulation_sweep(0.6, 0.02, false);
    let curve = HysteresisSimulator::new(&model)
        .with_mode(SweepMode::Full)
        .simulate(&sweep)
        .completed()
        .unwrap();
    let c = &curve.channels[0];
    let data = vec![ExperimentalData::new(c.h.clone(), c.m.clone()).unwrap()];

    let mut store = ParameterStore::from_params(&truth);
    store.set_value(ParamId::J1, -1.4);
    store.set_bounds(ParamId::J1, -2.0, -0.1).unwrap();
    store.set_fit(ParamId::J1, true).unwrap();

    let request =
        FitRequest::from_store(&store, &data, SweepMode::HalfMirror, FomSettings::default())
            .unwrap();
    let fit = FitEngine::new(FitPrecision::Fast)
        .with_seed(2)
        .fit_hysteresis(request, &CancelToken::new(), &NullObserver)
        .unwrap()
        .fitted()
        .unwrap();
    assert_eq!(fit.curve.channels[0].h, sweep);
    assert!(fit.fom.is_finite());
}

#[test]
fn job_runner_streams_fit_progress_and_result() {
    let truth = asymmetric_saf();
    let mut datasets = DatasetSet::new();
    datasets.push(synthetic_data(truth.clone())).unwrap();

    let mut store = ParameterStore::from_params(&truth);
    store.set_value(ParamId::J2, -0.05);
    store.set_bounds(ParamId::J2, -0.6, 0.0).unwrap();
    store.set_fit(ParamId::J2, true).unwrap();

    let runner = JobRunner::with_threads(2).unwrap();
    let mut job = FitJob::from_store(&store, &RunSettings::default(), &datasets).unwrap();
    job.engine = job.engine.with_seed(5);
    let events = runner.submit_fit(job).unwrap().wait();

    let improvements: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::BestFit(best) => Some(best.fom),
            _ => None,
        })
        .collect();
    assert!(!improvements.is_empty());
    assert!(improvements.windows(2).all(|w| w[1] < w[0]));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, JobEvent::Status(s) if s.starts_with("Global Fit (iteration")))
    );

    match events.last() {
        Some(JobEvent::Finished(JobOutput::Fit(fit))) => {
            assert_eq!(Some(&fit.fom), improvements.last());
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert!(!runner.is_busy());
}

#[test]
fn cancelled_fit_reports_cancelled_and_frees_the_runner() {
    let truth = asymmetric_saf();
    let mut datasets = DatasetSet::new();
    datasets.push(synthetic_data(truth.clone())).unwrap();

    let mut store = ParameterStore::from_params(&truth);
    store.set_bounds(ParamId::J1, -2.0, -0.1).unwrap();
    store.set_fit(ParamId::J1, true).unwrap();
    let settings = RunSettings {
        precision: FitPrecision::Precise,
        ..RunSettings::default()
    };

    let runner = JobRunner::with_threads(1).unwrap();
    let handle = runner
        .submit_fit(FitJob::from_store(&store, &settings, &datasets).unwrap())
        .unwrap();
    runner.cancel();
    let events = handle.wait();
    assert_eq!(events.last(), Some(&JobEvent::Cancelled));
    assert!(!runner.cancel_token().is_cancelled());

    // Nothing left over: the next job runs to completion.
    let sim = SimulationJob::from_settings(truth, &settings, &datasets);
    let events = runner.submit_simulation(sim).unwrap().wait();
    assert!(matches!(events.last(), Some(JobEvent::Finished(JobOutput::Simulation(_)))));
}

#[test]
fn measured_file_round_trips_through_export() {
    let text = "H\tM\nmT\tkA/m\n500\t800\n0\t0\n-500\t-800\n";
    let data = ExperimentalData::parse(text, 10e-9).unwrap();
    assert_eq!(data.h, vec![0.5, 0.0, -0.5]);
    assert!((data.m[0] - 8e-3).abs() < 1e-15);

    let params = SafParams::from_vector(
        &[4e-3, 0.0, PI / 2.0, -0.5e-3, 0.0, 4e-3, 0.0, PI / 2.0],
        vec![0.0],
    )
    .unwrap();
    let model = MacrospinModel::new(params).unwrap();
    let curve = HysteresisSimulator::new(&model)
        .simulate_channels(&[data.h.clone()])
        .unwrap()
        .completed()
        .unwrap();
    let table = to_table(&curve, ExportKind::Magnetization, Some(10e-9)).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "H\tM");
    assert_eq!(lines.len(), 2 + curve.channels[0].len());
}
