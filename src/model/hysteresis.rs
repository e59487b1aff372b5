use super::equilibrium::{Equilibrium, EquilibriumSolver};
use super::landscape::{effective_field_direction, EnergyLandscape};
use super::monitor::{CancelToken, NullObserver, RunObserver};
use super::sweep::{
    half_sweep_index, interpolate, interpolate_angles, reflect_angles, reflect_field,
    reflect_moment,
};
use crate::core::{MagsafError, MagsafResult, Outcome, SafParams};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callbacks per sweep: about 40 updates per channel.
const PROGRESS_UPDATES: usize = 40;

/// Validated parameter set ready for simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct MacrospinModel {
    params: SafParams,
    degeneracy_broken: bool,
}

impl MacrospinModel {
    /// Validates `params` and perturbs `phiani_A` by 0.01° when both layers are identical.
    pub fn new(mut params: SafParams) -> MagsafResult<Self> {
        params.validate()?;
        let degeneracy_broken = params.break_degeneracy();
        if degeneracy_broken {
            info!("Identical layers: phiani_A shifted by 0.01 deg to lift the degeneracy");
        }
        Ok(Self {
            params,
            degeneracy_broken,
        })
    }

    pub fn params(&self) -> &SafParams {
        &self.params
    }

    pub fn degeneracy_broken(&self) -> bool {
        self.degeneracy_broken
    }

    pub fn landscape(&self) -> EnergyLandscape<'_> {
        EnergyLandscape::new(&self.params)
    }

    /// Net moment projected on the nominal field direction `phi_h`.
    pub fn magnetization(&self, phi_a: f64, phi_b: f64, phi_h: f64) -> f64 {
        self.params.dms_a * (phi_a - phi_h).cos() + self.params.dms_b * (phi_b - phi_h).cos()
    }

    /// Normalized energy on an `n x n` angle grid for field `h` along channel `channel`.
    pub fn energy_map(&self, h: f64, channel: usize, n: usize) -> MagsafResult<Vec<Vec<f64>>> {
        let phi_h = self.params.phi_h.get(channel).copied().ok_or_else(|| {
            MagsafError::invalid(format!(
                "channel {} out of range ({} field directions)",
                channel,
                self.params.channels()
            ))
        })?;
        Ok(self.landscape().map(h, phi_h, n))
    }
}

/// Whether the ascending branch is simulated or reconstructed from the descending one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepMode {
    /// Every field value of the sweep is solved.
    Full,
    /// The sweep is solved down to its minimum field and the whole point reflection is
    /// appended. Field values after the minimum are not used.
    #[default]
    HalfMirror,
    /// The sweep is solved down to its minimum field and the reflection is interpolated onto
    /// the remaining field values, so the output has one point per sweep value. A sweep that
    /// ends at its minimum gets nothing appended.
    HalfOnAxis,
}

impl SweepMode {
    pub fn from_full_hysteresis(full: bool) -> Self {
        if full { Self::Full } else { Self::HalfMirror }
    }

    /// Mode for sweeps taken from a measured field axis: output aligned with the data.
    pub fn on_data_axis(self) -> Self {
        match self {
            Self::Full => Self::Full,
            Self::HalfMirror | Self::HalfOnAxis => Self::HalfOnAxis,
        }
    }
}

/// Trajectory of one field-direction channel, aligned to its field values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelTrajectory {
    pub phi_h: f64,
    pub h: Vec<f64>,
    pub m: Vec<f64>,
    pub phi_a: Vec<f64>,
    pub phi_b: Vec<f64>,
}

impl ChannelTrajectory {
    fn with_capacity(phi_h: f64, capacity: usize) -> Self {
        Self {
            phi_h,
            h: Vec::with_capacity(capacity),
            m: Vec::with_capacity(capacity),
            phi_a: Vec::with_capacity(capacity),
            phi_b: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    fn push(&mut self, h: f64, m: f64, phi_a: f64, phi_b: f64) {
        self.h.push(h);
        self.m.push(m);
        self.phi_a.push(phi_a);
        self.phi_b.push(phi_b);
    }

    /// Append the point reflection of the solved branch.
    fn append_reflection(&mut self) {
        let h = reflect_field(&self.h);
        let m = reflect_moment(&self.m);
        let phi_a = reflect_angles(&self.phi_a);
        let phi_b = reflect_angles(&self.phi_b);
        self.h.extend(h);
        self.m.extend(m);
        self.phi_a.extend(phi_a);
        self.phi_b.extend(phi_b);
    }

    /// Append the reflection of the solved branch sampled at `up_fields`.
    fn interpolate_reflection(&mut self, up_fields: &[f64]) {
        if up_fields.is_empty() {
            return;
        }
        let h = reflect_field(&self.h);
        let m = interpolate(up_fields, &h, &reflect_moment(&self.m));
        let phi_a = interpolate_angles(up_fields, &h, &reflect_angles(&self.phi_a));
        let phi_b = interpolate_angles(up_fields, &h, &reflect_angles(&self.phi_b));
        self.h.extend_from_slice(up_fields);
        self.m.extend(m);
        self.phi_a.extend(phi_a);
        self.phi_b.extend(phi_b);
    }
}

/// Solver diagnostics accumulated over a sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub points: usize,
    pub escaped: usize,
    pub stagnated: usize,
    pub unconverged: usize,
}

impl SweepStats {
    fn record(&mut self, eq: &Equilibrium) {
        self.points += 1;
        self.escaped += usize::from(eq.escaped);
        self.stagnated += usize::from(eq.stagnated);
        self.unconverged += usize::from(!eq.converged);
    }

    fn merge(mut self, other: SweepStats) -> Self {
        self.points += other.points;
        self.escaped += other.escaped;
        self.stagnated += other.stagnated;
        self.unconverged += other.unconverged;
        self
    }
}

/// Simulated loop: one trajectory per field direction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hysteresis {
    pub channels: Vec<ChannelTrajectory>,
    pub stats: SweepStats,
}

impl Hysteresis {
    pub fn magnetization(&self) -> Vec<&[f64]> {
        self.channels.iter().map(|c| c.m.as_slice()).collect()
    }

    pub fn phi_a(&self) -> Vec<&[f64]> {
        self.channels.iter().map(|c| c.phi_a.as_slice()).collect()
    }

    pub fn phi_b(&self) -> Vec<&[f64]> {
        self.channels.iter().map(|c| c.phi_b.as_slice()).collect()
    }
}

/// Sweeps field values through the equilibrium solver, channels in parallel.
pub struct HysteresisSimulator<'a> {
    model: &'a MacrospinModel,
    mode: SweepMode,
    cancel: Option<CancelToken>,
    observer: &'a dyn RunObserver,
    escape_rings: u32,
}

impl<'a> HysteresisSimulator<'a> {
    pub fn new(model: &'a MacrospinModel) -> Self {
        Self {
            model,
            mode: SweepMode::default(),
            cancel: None,
            observer: &NullObserver,
            escape_rings: 30,
        }
    }

    pub fn with_mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn RunObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_escape_rings(mut self, rings: u32) -> Self {
        self.escape_rings = rings;
        self
    }

    pub fn model(&self) -> &MacrospinModel {
        self.model
    }

    /// Simulate every channel over the same field sweep.
    pub fn simulate(&self, h_sweep: &[f64]) -> Outcome<Hysteresis> {
        let sweeps = vec![h_sweep; self.model.params().channels()];
        self.run(&sweeps)
    }

    /// Simulate with one field sweep per channel, e.g. each dataset's own field axis.
    pub fn simulate_channels(&self, sweeps: &[Vec<f64>]) -> MagsafResult<Outcome<Hysteresis>> {
        let channels = self.model.params().channels();
        if sweeps.len() != channels {
            return Err(MagsafError::DataShapeMismatch {
                datasets: sweeps.len(),
                channels,
            });
        }
        let sweeps: Vec<&[f64]> = sweeps.iter().map(Vec::as_slice).collect();
        Ok(self.run(&sweeps))
    }

    fn run(&self, sweeps: &[&[f64]]) -> Outcome<Hysteresis> {
        let aborted = AtomicBool::new(false);
        let results: Vec<Option<(ChannelTrajectory, SweepStats)>> = self
            .model
            .params()
            .phi_h
            .par_iter()
            .zip(sweeps.par_iter())
            .enumerate()
            .map(|(channel, (&phi_h, sweep))| self.run_channel(channel, phi_h, sweep, &aborted))
            .collect();

        if aborted.load(Ordering::SeqCst) {
            if let Some(token) = &self.cancel {
                token.take();
            }
            info!("Simulation cancelled");
            return Outcome::Cancelled;
        }

        let mut hysteresis = Hysteresis::default();
        for (trajectory, stats) in results.into_iter().flatten() {
            hysteresis.channels.push(trajectory);
            hysteresis.stats = hysteresis.stats.merge(stats);
        }
        if hysteresis.stats.stagnated > 0 {
            warn!(
                "{} of {} field points kept a non-minimum after the escape budget",
                hysteresis.stats.stagnated, hysteresis.stats.points
            );
        }
        Outcome::Completed(hysteresis)
    }

    fn cancelled(&self, aborted: &AtomicBool) -> bool {
        if aborted.load(Ordering::SeqCst) {
            return true;
        }
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            aborted.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    fn run_channel(
        &self,
        channel: usize,
        phi_h: f64,
        sweep: &[f64],
        aborted: &AtomicBool,
    ) -> Option<(ChannelTrajectory, SweepStats)> {
        let solved = match self.mode {
            SweepMode::Full => sweep.len(),
            SweepMode::HalfMirror | SweepMode::HalfOnAxis => {
                half_sweep_index(sweep).map_or(0, |i| i + 1)
            }
        };
        let interval = (solved / PROGRESS_UPDATES).max(1);
        let solver =
            EquilibriumSolver::new(self.model.landscape()).with_escape_rings(self.escape_rings);

        let mut trajectory = ChannelTrajectory::with_capacity(phi_h, sweep.len().max(2 * solved));
        let mut stats = SweepStats::default();
        // Saturated start: both moments along the field.
        let mut state = (phi_h, phi_h);

        for (i, &h) in sweep[..solved].iter().enumerate() {
            if i % interval == 0 {
                if self.cancelled(aborted) {
                    debug!("channel {} stopped at field point {}", channel, i);
                    return None;
                }
                self.observer.progress(channel, i as f64 / solved as f64);
            }

            let eq = solver.solve(state, h, effective_field_direction(h, phi_h));
            stats.record(&eq);
            state = (eq.phi_a, eq.phi_b);
            let m = self.model.magnetization(eq.phi_a, eq.phi_b, phi_h);
            trajectory.push(h, m, eq.phi_a, eq.phi_b);
        }

        match self.mode {
            SweepMode::Full => {}
            SweepMode::HalfMirror => trajectory.append_reflection(),
            SweepMode::HalfOnAxis => trajectory.interpolate_reflection(&sweep[solved..]),
        }
        self.observer.progress(channel, 1.0);
        Some((trajectory, stats))
    }
}
