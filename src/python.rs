use crate::config::RunSettings;
use crate::core::{MagsafError, Outcome, ParamId, ParameterStore};
use crate::data::{DatasetSet, ExperimentalData};
use crate::job::{FitJob, SimulationJob};
use crate::model::{CancelToken, Hysteresis, HysteresisSimulator, MacrospinModel, NullObserver};
use crate::optimization::FitOutcome;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn to_py_err(err: MagsafError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn param_id(name: &str) -> PyResult<ParamId> {
    ParamId::from_name(name)
        .ok_or_else(|| PyValueError::new_err(format!("Unknown parameter '{}'", name)))
}

/// Store from the eight display values `[dMs_A, Hani_A, phiani_A, J1, J2, dMs_B, Hani_B, phiani_B]`
fn build_store(values: &[f64], phi_h_deg: Vec<f64>) -> PyResult<ParameterStore> {
    if values.len() != ParamId::ALL.len() {
        return Err(PyValueError::new_err(format!(
            "Expected {} parameter values, got {}",
            ParamId::ALL.len(),
            values.len()
        )));
    }
    let mut store = ParameterStore::new();
    for (&id, &value) in ParamId::ALL.iter().zip(values) {
        store.set_value(id, value);
    }
    store.set_phi_h_deg(phi_h_deg);
    Ok(store)
}

fn datasets(h: Vec<Vec<f64>>, m: Vec<Vec<f64>>) -> PyResult<DatasetSet> {
    if h.len() != m.len() {
        return Err(PyValueError::new_err(
            "data_h and data_m must have the same number of datasets",
        ));
    }
    let data = h
        .into_iter()
        .zip(m)
        .map(|(h, m)| ExperimentalData::new(h, m))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    DatasetSet::from_vec(data).map_err(to_py_err)
}

#[pyclass(name = "RunSettings")]
#[derive(Clone, Debug, Default)]
pub struct PyRunSettings {
    inner: RunSettings,
}

#[pymethods]
impl PyRunSettings {
    #[new]
    #[pyo3(signature = (json=None))]
    fn new(json: Option<&str>) -> PyResult<Self> {
        let inner = match json {
            Some(json) => RunSettings::from_json_str(json).map_err(to_py_err)?,
            None => RunSettings::default(),
        };
        Ok(Self { inner })
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json_string().map_err(to_py_err)
    }

    #[getter]
    fn field_max_mt(&self) -> f64 {
        self.inner.field_max_mt
    }

    #[setter]
    fn set_field_max_mt(&mut self, value: f64) {
        self.inner.field_max_mt = value;
    }

    #[getter]
    fn field_step_mt(&self) -> f64 {
        self.inner.field_step_mt
    }

    #[setter]
    fn set_field_step_mt(&mut self, value: f64) {
        self.inner.field_step_mt = value;
    }

    #[getter]
    fn full_hysteresis(&self) -> bool {
        self.inner.full_hysteresis
    }

    #[setter]
    fn set_full_hysteresis(&mut self, value: bool) {
        self.inner.full_hysteresis = value;
    }

    fn __repr__(&self) -> String {
        format!("RunSettings({:?})", self.inner)
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct SimulationResult {
    #[pyo3(get)]
    pub h: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub m: Vec<Vec<f64>>,
    /// Degrees
    #[pyo3(get)]
    pub phi_a: Vec<Vec<f64>>,
    #[pyo3(get)]
    pub phi_b: Vec<Vec<f64>>,
}

impl From<Hysteresis> for SimulationResult {
    fn from(curve: Hysteresis) -> Self {
        let degrees = |v: &[f64]| v.iter().map(|p| p.to_degrees()).collect::<Vec<_>>();
        Self {
            h: curve.channels.iter().map(|c| c.h.clone()).collect(),
            m: curve.channels.iter().map(|c| c.m.clone()).collect(),
            phi_a: curve.channels.iter().map(|c| degrees(&c.phi_a)).collect(),
            phi_b: curve.channels.iter().map(|c| degrees(&c.phi_b)).collect(),
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct FitReport {
    #[pyo3(get)]
    pub success: bool,
    #[pyo3(get)]
    pub cancelled: bool,
    #[pyo3(get)]
    pub message: String,
    #[pyo3(get)]
    pub fom: f64,
    /// All eight parameters in display units, fitted entries replaced
    #[pyo3(get)]
    pub values: Vec<f64>,
    #[pyo3(get)]
    pub curve: Option<SimulationResult>,
}

/// Simulate the loop for display-unit parameters, on the data's field axes when given.
#[pyfunction]
#[pyo3(signature = (values, phi_h_deg, settings=None, data_h=None))]
fn simulate(
    py: Python<'_>,
    values: Vec<f64>,
    phi_h_deg: Vec<f64>,
    settings: Option<PyRunSettings>,
    data_h: Option<Vec<Vec<f64>>>,
) -> PyResult<Option<SimulationResult>> {
    let settings = settings.unwrap_or_default().inner;
    let params = build_store(&values, phi_h_deg)?.to_params().map_err(to_py_err)?;
    let mut job = SimulationJob::from_settings(params, &settings, &DatasetSet::new());
    if let Some(axes) = data_h {
        job.sweeps = axes;
        job.mode = job.mode.on_data_axis();
    }
    let model = MacrospinModel::new(job.params.clone()).map_err(to_py_err)?;

    let outcome = py.allow_threads(|| {
        HysteresisSimulator::new(&model)
            .with_mode(job.mode)
            .with_cancel(CancelToken::new())
            .with_observer(&NullObserver)
            .simulate_channels(&job.sweeps)
    });
    match outcome.map_err(to_py_err)? {
        Outcome::Completed(curve) => Ok(Some(curve.into())),
        Outcome::Cancelled => Ok(None),
    }
}

/// Fit the named parameters within display-unit bounds to measured loops.
#[pyfunction]
#[pyo3(signature = (values, phi_h_deg, fit, bounds, data_h, data_m, settings=None, seed=None))]
#[allow(clippy::too_many_arguments)]
fn fit(
    py: Python<'_>,
    values: Vec<f64>,
    phi_h_deg: Vec<f64>,
    fit: Vec<String>,
    bounds: Vec<(f64, f64)>,
    data_h: Vec<Vec<f64>>,
    data_m: Vec<Vec<f64>>,
    settings: Option<PyRunSettings>,
    seed: Option<u64>,
) -> PyResult<FitReport> {
    let settings = settings.unwrap_or_default().inner;
    if fit.len() != bounds.len() {
        return Err(PyValueError::new_err("fit and bounds must have the same length"));
    }
    let mut store = build_store(&values, phi_h_deg)?;
    for (name, &(lower, upper)) in fit.iter().zip(&bounds) {
        let id = param_id(name)?;
        store.set_bounds(id, lower, upper).map_err(to_py_err)?;
        store.set_fit(id, true).map_err(to_py_err)?;
    }
    let data = datasets(data_h, data_m)?;
    let mut job = FitJob::from_store(&store, &settings, &data).map_err(to_py_err)?;
    if let Some(seed) = seed {
        job.engine = job.engine.with_seed(seed);
    }

    let cancel = CancelToken::new();
    let outcome = py
        .allow_threads(|| job.engine.fit_hysteresis(job.request(), &cancel, &NullObserver))
        .map_err(to_py_err)?;

    Ok(match outcome {
        FitOutcome::Fitted(result) => {
            store.write_back(&result.params, &result.ids);
            let values = ParamId::ALL
                .iter()
                .map(|&id| store.value(id).unwrap_or(f64::NAN))
                .collect();
            let (success, message) = match &result.result.polish {
                Some(p) => (p.success, p.message.clone()),
                None => (result.result.global.success, result.result.global.message.clone()),
            };
            FitReport {
                success,
                cancelled: false,
                message,
                fom: result.fom,
                values,
                curve: Some(result.curve.into()),
            }
        }
        FitOutcome::Cancelled => FitReport {
            success: false,
            cancelled: true,
            message: "Fit aborted.".to_string(),
            fom: f64::NAN,
            values,
            curve: None,
        },
        FitOutcome::Failed(message) => FitReport {
            success: false,
            cancelled: false,
            message,
            fom: f64::NAN,
            values,
            curve: None,
        },
    })
}

#[pymodule]
fn magsaf(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRunSettings>()?;
    m.add_class::<SimulationResult>()?;
    m.add_class::<FitReport>()?;
    m.add_function(wrap_pyfunction!(simulate, m)?)?;
    m.add_function(wrap_pyfunction!(fit, m)?)?;
    Ok(())
}
