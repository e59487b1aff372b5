use super::fom::{figure_of_merit, FomSettings};
use super::solvers::traits::Problem;
use crate::core::{
    ConstraintSet, FitSetup, MagsafError, MagsafResult, Outcome, ParamId, SafParams,
};
use crate::data::ExperimentalData;
use crate::model::{
    BestFit, CancelToken, Hysteresis, HysteresisSimulator, MacrospinModel, RunObserver, SweepMode,
};
use log::{debug, info};
use std::cell::{Cell, RefCell};

/// Hysteresis fit against measured loops: one dataset per field direction
pub struct HysteresisProblem<'a> {
    base: SafParams,
    ids: Vec<ParamId>,
    initial: Vec<f64>,
    bounds: Vec<(f64, f64)>,
    constraints: ConstraintSet,
    datasets: &'a [ExperimentalData],
    sweeps: Vec<Vec<f64>>,
    mode: SweepMode,
    fom: FomSettings,
    cancel: CancelToken,
    observer: &'a dyn RunObserver,

    best: RefCell<Option<BestFit>>,
    evaluations: Cell<usize>,
}

impl<'a> HysteresisProblem<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: SafParams,
        setup: FitSetup,
        constraints: ConstraintSet,
        datasets: &'a [ExperimentalData],
        mode: SweepMode,
        fom: FomSettings,
        cancel: CancelToken,
        observer: &'a dyn RunObserver,
    ) -> MagsafResult<Self> {
        base.validate()?;
        if datasets.len() != base.channels() {
            return Err(MagsafError::DataShapeMismatch {
                datasets: datasets.len(),
                channels: base.channels(),
            });
        }
        if setup.ids.is_empty() {
            return Err(MagsafError::invalid("no parameter is selected for fitting"));
        }
        if setup.initial.len() != setup.ids.len() || setup.bounds.len() != setup.ids.len() {
            return Err(MagsafError::LengthMismatch {
                expected: setup.ids.len(),
                found: setup.initial.len().min(setup.bounds.len()),
            });
        }
        for ((id, &x), &(lo, hi)) in setup.ids.iter().zip(&setup.initial).zip(&setup.bounds) {
            if !(lo <= hi) || x < lo || x > hi {
                return Err(MagsafError::invalid(format!(
                    "{} start value {} lies outside its bounds ({}, {})",
                    id.name(),
                    x,
                    lo,
                    hi
                )));
            }
        }
        constraints.check_fit_set(&setup.ids)?;

        Ok(Self {
            base,
            ids: setup.ids,
            initial: setup.initial,
            bounds: setup.bounds,
            constraints,
            datasets,
            sweeps: datasets.iter().map(|d| d.h.clone()).collect(),
            mode: mode.on_data_axis(),
            fom,
            cancel,
            observer,
            best: RefCell::new(None),
            evaluations: Cell::new(0),
        })
    }

    pub fn ids(&self) -> &[ParamId] {
        &self.ids
    }

    /// Base parameters with the fitted entries replaced and links re-derived.
    pub fn params_for(&self, values: &[f64]) -> SafParams {
        let mut params = self.base.clone();
        for (&id, &value) in self.ids.iter().zip(values) {
            params.set(id, value);
        }
        self.constraints.apply(&mut params);
        params
    }

    pub fn simulate(&self, params: SafParams) -> MagsafResult<Outcome<Hysteresis>> {
        let model = MacrospinModel::new(params)?;
        HysteresisSimulator::new(&model)
            .with_mode(self.mode)
            .with_cancel(self.cancel.clone())
            .with_observer(self.observer)
            .simulate_channels(&self.sweeps)
    }

    /// Lowest-FOM candidate evaluated so far.
    pub fn best(&self) -> Option<BestFit> {
        self.best.borrow().clone()
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    fn record(&self, params: SafParams, fom: f64, curve: Hysteresis) {
        let improved = self.best.borrow().as_ref().is_none_or(|b| fom < b.fom);
        if !improved {
            return;
        }

        info!("New FOM: {:.8}", fom);
        for &id in &self.ids {
            info!("  {} = {:.6} {}", id.name(), id.to_display(params.get(id)), id.display_unit());
        }
        let best = BestFit { params, fom, curve };
        self.observer.improved(&best);
        *self.best.borrow_mut() = Some(best);
    }
}

impl Problem for HysteresisProblem<'_> {
    fn cost(&self, values: &[f64]) -> MagsafResult<f64> {
        self.evaluations.set(self.evaluations.get() + 1);
        let params = self.params_for(values);

        let curve = match self.simulate(params.clone()) {
            Ok(Outcome::Completed(curve)) => curve,
            Ok(Outcome::Cancelled) => return Err(MagsafError::Cancelled),
            // Trial outside the physical domain, e.g. both couplings zero.
            Err(MagsafError::InvalidParameter(reason)) => {
                debug!("trial rejected: {}", reason);
                return Ok(f64::INFINITY);
            }
            Err(e) => return Err(e),
        };

        let fom = figure_of_merit(&curve, self.datasets, &self.fom)?;
        debug!("evaluation {}: FOM = {:.8}", self.evaluations.get(), fom);
        self.record(params, fom, curve);
        Ok(fom)
    }

    fn num_params(&self) -> usize {
        self.ids.len()
    }

    fn initial_params(&self) -> &[f64] {
        &self.initial
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }
}
