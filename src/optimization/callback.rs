use super::solvers::traits::OptimizationCallback;
use crate::core::{MagsafResult, ParamId};
use crate::model::{CancelToken, RunObserver};
use log::{debug, info};

/// Iteration result for tracking optimization progress
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub params: Vec<f64>,
    pub cost: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitStage {
    Global,
    Polish,
}

impl FitStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Global => "Global Fit",
            Self::Polish => "Polish Fit",
        }
    }
}

/// Records stage history and forwards "<stage> (iteration N)" status lines
pub struct FitCallback<'a> {
    stage: FitStage,
    observer: &'a dyn RunObserver,
    cancel: CancelToken,
    history: Vec<IterationResult>,
    param_ids: Vec<ParamId>,
}

impl<'a> FitCallback<'a> {
    pub fn new(stage: FitStage, observer: &'a dyn RunObserver, cancel: CancelToken) -> Self {
        Self {
            stage,
            observer,
            cancel,
            history: Vec::new(),
            param_ids: Vec::new(),
        }
    }

    /// Names used when logging the summary; the order matches the parameter vector
    pub fn with_param_ids(mut self, ids: Vec<ParamId>) -> Self {
        self.param_ids = ids;
        self
    }

    /// Get iteration history
    pub fn history(&self) -> &[IterationResult] {
        &self.history
    }

    pub fn log_summary(&self, success: bool, message: &str) {
        info!("{} success: {}", self.stage.label(), success);
        info!("{} message: {}", self.stage.label(), message);
        if let Some(last) = self.history.last() {
            info!(
                "{}: {} iterations, final cost {:.6e}",
                self.stage.label(),
                self.history.len(),
                last.cost
            );
            for (id, &value) in self.param_ids.iter().zip(&last.params) {
                info!("  {} = {:.6} {}", id.name(), id.to_display(value), id.display_unit());
            }
        }
    }
}

impl OptimizationCallback for FitCallback<'_> {
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> MagsafResult<()> {
        self.history.push(IterationResult {
            params: params.to_vec(),
            cost,
        });

        debug!("{} iteration {}: cost = {:.6e}", self.stage.label(), iteration, cost);
        self.observer
            .status(&format!("{} (iteration {})", self.stage.label(), iteration));
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
