//! One simulation or fit at a time on a worker thread, with events streamed back over a
//! channel in the order they are produced.

use crate::config::RunSettings;
use crate::core::{
    ConstraintSet, FitSetup, MagsafError, MagsafResult, Outcome, ParameterStore, SafParams,
};
use crate::data::{DatasetSet, ExperimentalData};
use crate::model::{
    BestFit, CancelToken, Hysteresis, HysteresisSimulator, MacrospinModel, RunObserver, SweepMode,
};
use crate::optimization::{FitEngine, FitOutcome, FitRequest, FomSettings, HysteresisFit};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Clone, Debug, PartialEq)]
pub enum JobOutput {
    Simulation(Hysteresis),
    Fit(HysteresisFit),
}

#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    Progress { channel: usize, fraction: f64 },
    Status(String),
    BestFit(BestFit),
    Finished(JobOutput),
    Cancelled,
    Failed(String),
}

impl JobEvent {
    /// Last event of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Cancelled | Self::Failed(_))
    }
}

/// Forwards run signals into the job's event channel.
struct ChannelObserver {
    tx: Sender<JobEvent>,
}

impl ChannelObserver {
    fn send(&self, event: JobEvent) {
        // Receiver gone: nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl RunObserver for ChannelObserver {
    fn progress(&self, channel: usize, fraction: f64) {
        self.send(JobEvent::Progress { channel, fraction });
    }

    fn status(&self, message: &str) {
        self.send(JobEvent::Status(message.to_string()));
    }

    fn improved(&self, best: &BestFit) {
        self.send(JobEvent::BestFit(best.clone()));
    }
}

/// Simulation inputs, snapshotted at submit time.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationJob {
    pub params: SafParams,
    pub sweeps: Vec<Vec<f64>>,
    pub mode: SweepMode,
}

impl SimulationJob {
    /// Sweeps follow the loaded data when there is any, the configured field range otherwise.
    pub fn from_settings(
        params: SafParams,
        settings: &RunSettings,
        datasets: &DatasetSet,
    ) -> Self {
        let (sweeps, mode) = if datasets.is_empty() {
            (vec![settings.field_sweep(); params.channels()], settings.sweep_mode())
        } else {
            (datasets.field_axes(), settings.sweep_mode().on_data_axis())
        };
        Self {
            params,
            sweeps,
            mode,
        }
    }
}

/// Fit inputs, snapshotted at submit time.
#[derive(Clone, Debug)]
pub struct FitJob {
    pub params: SafParams,
    pub setup: FitSetup,
    pub constraints: ConstraintSet,
    pub datasets: Vec<ExperimentalData>,
    pub mode: SweepMode,
    pub fom: FomSettings,
    pub engine: FitEngine,
}

impl FitJob {
    pub fn from_store(
        store: &ParameterStore,
        settings: &RunSettings,
        datasets: &DatasetSet,
    ) -> MagsafResult<Self> {
        Ok(Self {
            params: store.to_params()?,
            setup: store.fit_setup()?,
            constraints: store.constraints()?,
            datasets: datasets.as_slice().to_vec(),
            mode: settings.sweep_mode(),
            fom: settings.fom_settings()?,
            engine: FitEngine::new(settings.precision),
        })
    }

    /// Borrowing view handed to the engine.
    pub fn request(&self) -> FitRequest<'_> {
        FitRequest {
            params: self.params.clone(),
            setup: self.setup.clone(),
            constraints: self.constraints.clone(),
            datasets: &self.datasets,
            mode: self.mode,
            fom: self.fom,
        }
    }

    fn run(
        &self,
        cancel: &CancelToken,
        observer: &dyn RunObserver,
    ) -> MagsafResult<FitOutcome<HysteresisFit>> {
        self.engine.fit_hysteresis(self.request(), cancel, observer)
    }
}

/// Events of a submitted job. Dropping it detaches the worker.
pub struct JobHandle {
    events: Receiver<JobEvent>,
    worker: Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Block until the job ends; returns every event, the terminal one last.
    ///
    /// The runner accepts a new job once this returns.
    pub fn wait(mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        for event in self.events.iter() {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("job worker panicked");
            }
        }
        if !events.last().is_some_and(JobEvent::is_terminal) {
            events.push(JobEvent::Failed("job ended without a result".to_string()));
        }
        events
    }
}

/// Released when the worker finishes, panics included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs at most one job at a time; per-channel sweeps share a rayon pool.
pub struct JobRunner {
    busy: Arc<AtomicBool>,
    cancel: CancelToken,
    pool: Arc<ThreadPool>,
}

impl JobRunner {
    pub fn new() -> MagsafResult<Self> {
        Self::with_threads(num_cpus::get())
    }

    pub fn with_threads(threads: usize) -> MagsafResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("magsaf-sweep-{}", i))
            .build()?;
        Ok(Self {
            busy: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            pool: Arc::new(pool),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Ask the running job to stop at its next check.
    pub fn cancel(&self) {
        if self.is_busy() {
            self.cancel.cancel();
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn submit_simulation(&self, job: SimulationJob) -> MagsafResult<JobHandle> {
        let model = MacrospinModel::new(job.params.clone())?;
        self.spawn("simulation", move |cancel, observer| {
            let outcome = HysteresisSimulator::new(&model)
                .with_mode(job.mode)
                .with_cancel(cancel.clone())
                .with_observer(observer)
                .simulate_channels(&job.sweeps);
            match outcome {
                Ok(Outcome::Completed(curve)) => JobEvent::Finished(JobOutput::Simulation(curve)),
                Ok(Outcome::Cancelled) => JobEvent::Cancelled,
                Err(e) => JobEvent::Failed(e.to_string()),
            }
        })
    }

    pub fn submit_fit(&self, job: FitJob) -> MagsafResult<JobHandle> {
        self.spawn("fit", move |cancel, observer| match job.run(cancel, observer) {
            Ok(FitOutcome::Fitted(fit)) => JobEvent::Finished(JobOutput::Fit(fit)),
            Ok(FitOutcome::Cancelled) => JobEvent::Cancelled,
            Ok(FitOutcome::Failed(message)) => JobEvent::Failed(message),
            Err(e) => JobEvent::Failed(e.to_string()),
        })
    }

    fn spawn<F>(&self, kind: &'static str, work: F) -> MagsafResult<JobHandle>
    where
        F: FnOnce(&CancelToken, &dyn RunObserver) -> JobEvent + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MagsafError::Busy);
        }
        let guard = BusyGuard(self.busy.clone());
        // A stale request from the previous job must not stop this one.
        self.cancel.take();

        let (tx, rx) = unbounded();
        let cancel = self.cancel.clone();
        let pool = self.pool.clone();
        let worker = std::thread::Builder::new()
            .name(format!("magsaf-{}", kind))
            .spawn(move || {
                info!("{} job started", kind);
                let observer = ChannelObserver { tx };
                let last = pool.install(|| work(&cancel, &observer));
                cancel.take();
                info!("{} job ended", kind);
                observer.send(last);
                drop(guard);
            })?;

        Ok(JobHandle {
            events: rx,
            worker: Some(worker),
        })
    }
}
