pub mod config;
pub mod core;
pub mod data;
pub mod job;
pub mod model;
pub mod optimization;

#[cfg(feature = "python")]
mod python;

pub use crate::config::{RegionBoundaries, RunSettings, SampleNominal};
pub use crate::core::*;
pub use crate::data::{DatasetSet, ExperimentalData, ExportKind};
pub use crate::job::{FitJob, JobEvent, JobHandle, JobOutput, JobRunner, SimulationJob};
pub use crate::model::{
    BestFit, CancelToken, Hysteresis, HysteresisSimulator, MacrospinModel, NullObserver,
    RunObserver, SweepMode,
};
pub use crate::optimization::{FitEngine, FitOutcome, FitRequest, FomSettings, HysteresisFit};
