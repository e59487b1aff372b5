pub mod callback;
pub mod engine;
pub mod fom;
pub mod problem;
pub mod solvers;

pub use callback::{FitCallback, FitStage, IterationResult};
pub use engine::{FitEngine, FitOutcome, FitRequest, FitResult, HysteresisFit, StageSummary};
pub use fom::{channel_fom, figure_of_merit, FomSettings, FOCUS_WEIGHT};
pub use problem::HysteresisProblem;
pub use solvers::{global_solver, BoundedBfgs, DifferentialEvolution};
pub use solvers::{OptimizationCallback, Problem, Solver, SolverResult};
