pub mod equilibrium;
pub mod hysteresis;
pub mod landscape;
pub mod monitor;
pub mod sweep;

pub use equilibrium::{Equilibrium, EquilibriumSolver};
pub use hysteresis::{
    ChannelTrajectory, Hysteresis, HysteresisSimulator, MacrospinModel, SweepMode, SweepStats,
};
pub use landscape::{
    angle_axis, effective_field_direction, Curvature, EnergyLandscape, EnergyPoint, PointKind,
};
pub use monitor::{BestFit, CancelToken, NullObserver, RunObserver};
pub use sweep::{half_sweep_index, linspace, simulation_sweep};
