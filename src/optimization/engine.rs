//! Two-stage fit: differential evolution over the bounds, then a bounded BFGS polish
//! started from the global result.

use super::callback::{FitCallback, FitStage};
use super::fom::FomSettings;
use super::problem::HysteresisProblem;
use super::solvers::{global_solver, BoundedBfgs, Problem, Solver, SolverResult};
use crate::core::{
    ConstraintSet, FitPrecision, FitSetup, MagsafError, MagsafResult, ParamId, ParameterStore,
    SafParams,
};
use crate::data::ExperimentalData;
use crate::model::{BestFit, CancelToken, Hysteresis, RunObserver, SweepMode};
use log::{info, warn};

/// Result of a fit that may be stopped by the user or fail numerically.
#[derive(Clone, Debug, PartialEq)]
pub enum FitOutcome<T> {
    Fitted(T),
    Cancelled,
    /// Numerical failure inside a stage; the message was already sent as status.
    Failed(String),
}

impl<T> FitOutcome<T> {
    pub fn fitted(self) -> Option<T> {
        match self {
            Self::Fitted(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StageSummary {
    pub success: bool,
    pub message: String,
    pub cost: f64,
    pub iterations: u32,
    pub cost_evals: usize,
}

impl From<&SolverResult> for StageSummary {
    fn from(result: &SolverResult) -> Self {
        Self {
            success: result.success,
            message: result.message.clone(),
            cost: result.cost,
            iterations: result.iterations,
            cost_evals: result.cost_evals,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    /// Optimizer coordinates of the final point, one per fitted parameter.
    pub params: Vec<f64>,
    pub cost: f64,
    pub global: StageSummary,
    /// Missing when the polish stage errored and the global result was kept.
    pub polish: Option<StageSummary>,
}

/// Same problem, different start point.
struct Restart<'a> {
    inner: &'a dyn Problem,
    initial: Vec<f64>,
}

impl Problem for Restart<'_> {
    fn cost(&self, params: &[f64]) -> MagsafResult<f64> {
        self.inner.cost(params)
    }

    fn num_params(&self) -> usize {
        self.inner.num_params()
    }

    fn initial_params(&self) -> &[f64] {
        &self.initial
    }

    fn bounds(&self) -> &[(f64, f64)] {
        self.inner.bounds()
    }
}

/// Everything a hysteresis fit needs, snapshotted before the run starts.
#[derive(Clone, Debug)]
pub struct FitRequest<'a> {
    pub params: SafParams,
    pub setup: FitSetup,
    pub constraints: ConstraintSet,
    pub datasets: &'a [ExperimentalData],
    pub mode: SweepMode,
    pub fom: FomSettings,
}

impl<'a> FitRequest<'a> {
    pub fn from_store(
        store: &ParameterStore,
        datasets: &'a [ExperimentalData],
        mode: SweepMode,
        fom: FomSettings,
    ) -> MagsafResult<Self> {
        Ok(Self {
            params: store.to_params()?,
            setup: store.fit_setup()?,
            constraints: store.constraints()?,
            datasets,
            mode,
            fom,
        })
    }
}

/// Best candidate of a finished hysteresis fit.
#[derive(Clone, Debug, PartialEq)]
pub struct HysteresisFit {
    pub params: SafParams,
    pub ids: Vec<ParamId>,
    pub fom: f64,
    pub curve: Hysteresis,
    pub result: FitResult,
}

#[derive(Clone, Debug)]
pub struct FitEngine {
    precision: FitPrecision,
    polish_iterations: u64,
    seed: Option<u64>,
}

impl FitEngine {
    pub fn new(precision: FitPrecision) -> Self {
        Self {
            precision,
            polish_iterations: 200,
            seed: None,
        }
    }

    pub fn with_polish_iterations(mut self, iterations: u64) -> Self {
        self.polish_iterations = iterations;
        self
    }

    /// Fix the global stage's random stream
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn precision(&self) -> FitPrecision {
        self.precision
    }

    /// Minimize `problem` inside its bounds. Cancellation and stage failures are reported
    /// through the outcome, never as errors.
    pub fn fit(
        &self,
        problem: &dyn Problem,
        ids: &[ParamId],
        cancel: &CancelToken,
        observer: &dyn RunObserver,
    ) -> FitOutcome<FitResult> {
        info!(
            "Fit started: {} parameters, {:?} preset",
            problem.num_params(),
            self.precision
        );

        let mut callback = FitCallback::new(FitStage::Global, observer, cancel.clone())
            .with_param_ids(ids.to_vec());
        let mut solver = global_solver(self.precision, self.seed);
        let global = match solver.solve(problem, &mut callback) {
            Ok(result) => result,
            Err(e) => return self.abort(e, cancel, observer),
        };
        callback.log_summary(global.success, &global.message);
        if !global.success {
            warn!("Global Fit did not converge: {}", global.message);
        }
        if cancel.take() {
            return self.aborted(observer);
        }

        let restart = Restart {
            inner: problem,
            initial: global.params.clone(),
        };
        let mut callback = FitCallback::new(FitStage::Polish, observer, cancel.clone())
            .with_param_ids(ids.to_vec());
        let mut polisher = BoundedBfgs::new(self.polish_iterations);
        let polish = match polisher.solve(&restart, &mut callback) {
            Ok(result) => {
                callback.log_summary(result.success, &result.message);
                if !result.success {
                    warn!("Polish Fit did not converge: {}", result.message);
                }
                Some(result)
            }
            Err(MagsafError::Optimizer(message)) => {
                warn!("Polish Fit failed, keeping global result: {}", message);
                None
            }
            Err(e) => return self.abort(e, cancel, observer),
        };
        if cancel.take() {
            return self.aborted(observer);
        }

        let (params, cost) = match &polish {
            Some(p) if p.cost <= global.cost => (p.params.clone(), p.cost),
            _ => (global.params.clone(), global.cost),
        };
        info!("Fit finished: cost {:.8}", cost);
        observer.status("Fit finished");
        FitOutcome::Fitted(FitResult {
            params,
            cost,
            global: StageSummary::from(&global),
            polish: polish.as_ref().map(StageSummary::from),
        })
    }

    /// Run the full fit of `request` and return the lowest-FOM candidate seen.
    ///
    /// Configuration errors are returned before any work starts.
    pub fn fit_hysteresis(
        &self,
        request: FitRequest<'_>,
        cancel: &CancelToken,
        observer: &dyn RunObserver,
    ) -> MagsafResult<FitOutcome<HysteresisFit>> {
        let ids = request.setup.ids.clone();
        let problem = HysteresisProblem::new(
            request.params,
            request.setup,
            request.constraints,
            request.datasets,
            request.mode,
            request.fom,
            cancel.clone(),
            observer,
        )?;

        let result = match self.fit(&problem, &ids, cancel, observer) {
            FitOutcome::Fitted(result) => result,
            FitOutcome::Cancelled => return Ok(FitOutcome::Cancelled),
            FitOutcome::Failed(message) => return Ok(FitOutcome::Failed(message)),
        };
        info!("Fit used {} simulations", problem.evaluations());

        Ok(match problem.best() {
            Some(BestFit { params, fom, curve }) => FitOutcome::Fitted(HysteresisFit {
                params,
                ids,
                fom,
                curve,
                result,
            }),
            None => {
                let message = "no trial produced a valid simulation".to_string();
                observer.status(&format!("Fit Error: {}", message));
                FitOutcome::Failed(message)
            }
        })
    }

    fn abort<T>(
        &self,
        err: MagsafError,
        cancel: &CancelToken,
        observer: &dyn RunObserver,
    ) -> FitOutcome<T> {
        cancel.take();
        if err.is_cancelled() {
            return self.aborted(observer);
        }
        warn!("Fit Error: {}", err);
        observer.status(&format!("Fit Error: {}", err));
        FitOutcome::Failed(err.to_string())
    }

    fn aborted<T>(&self, observer: &dyn RunObserver) -> FitOutcome<T> {
        info!("Fit aborted.");
        observer.status("Fit aborted.");
        FitOutcome::Cancelled
    }
}
