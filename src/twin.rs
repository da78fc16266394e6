// CYBERTWIN TWIN EVALUATOR
// COST OF ONE CANDIDATE = MEAN OVER REPLICAS OF THE WAITING TIME ADDED DURING A FIXED
// MEASUREMENT WINDOW, REPLAYED FROM THE EPISODE CHECKPOINT ON ISOLATED TWIN HANDLES.
//
// PER REPLICA: RESTORE -> APPLY CANDIDATE -> WARMUP (UNMEASURED) -> RESET METER -> MEASURE.
// REPLICAS RUN ON SCOPED THREADS: EACH OWNS ITS HANDLE AND METER, ONLY THE CANDIDATE IS
// SHARED (READ-ONLY). EVERY CANDIDATE SEES THE SAME SEED SEQUENCE.

use tracing::{debug, warn};

use crate::apply::{Applier, ApplyError};
use crate::checkpoint::{CheckpointManager, Replica};
use crate::collector::WaitMeter;
use crate::engine::{EngineError, Launcher, SimHandle};
use crate::model::Configuration;

#[derive(Debug, thiserror::Error)]
pub enum TwinError {
    #[error("twin evaluation needs at least one replica")]
    EmptyReplicationSet,
    #[error("twin replica {index} (seed {seed:?}): {source}")]
    Engine {
        index: usize,
        seed: Option<u64>,
        #[source]
        source: EngineError,
    },
    #[error("twin replica {index}: {source}")]
    Apply {
        index: usize,
        #[source]
        source: ApplyError,
    },
    #[error("twin replica worker panicked")]
    WorkerPanicked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub warmup: u32,
    pub measure: u32,
}

struct Twin {
    replica: Replica,
    handle: Box<dyn SimHandle>,
    meter: WaitMeter,
}

impl Twin {
    fn engine_err(&self, index: usize) -> impl Fn(EngineError) -> TwinError {
        let seed = self.replica.seed;
        move |source| TwinError::Engine { index, seed, source }
    }

    fn run(&mut self, index: usize, applier: &Applier, config: &Configuration, window: Window) -> Result<f64, TwinError> {
        let err = self.engine_err(index);
        let handle = self.handle.as_mut();

        CheckpointManager::restore(&self.replica.checkpoint, handle).map_err(&err)?;
        applier.apply(handle, config).map_err(|source| match source {
            ApplyError::Engine(source) => err(source),
            source => TwinError::Apply { index, source },
        })?;

        for _ in 0..window.warmup {
            handle.step().map_err(&err)?;
        }

        self.meter.reset();
        let mut cost = 0.0;
        for _ in 0..window.measure {
            handle.step().map_err(&err)?;
            cost += self.meter.sample(handle).map_err(&err)?;
        }
        Ok(cost)
    }
}

impl Drop for Twin {
    fn drop(&mut self) {
        if let Err(e) = self.handle.close() {
            warn!("TWIN CLOSE FAILED (seed {:?}): {}", self.replica.seed, e);
        }
    }
}

pub struct TwinEvaluator {
    twins: Vec<Twin>,
    applier: Applier,
    window: Window,
    evaluations: u64,
}

impl TwinEvaluator {
    // LAUNCHES ONE TWIN PER REPLICA. A FAILED LAUNCH CLOSES THE TWINS ALREADY STARTED.
    pub fn open(
        launcher: &dyn Launcher,
        replicas: Vec<Replica>,
        applier: Applier,
        window: Window,
    ) -> Result<Self, TwinError> {
        if replicas.is_empty() {
            return Err(TwinError::EmptyReplicationSet);
        }
        let mut twins = Vec::with_capacity(replicas.len());
        for (index, replica) in replicas.into_iter().enumerate() {
            let handle = launcher.launch(replica.seed)
                .map_err(|source| TwinError::Engine { index, seed: replica.seed, source })?;
            twins.push(Twin { replica, handle, meter: WaitMeter::new() });
        }
        Ok(Self { twins, applier, window, evaluations: 0 })
    }

    pub fn replicas(&self) -> usize {
        self.twins.len()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn evaluate(&mut self, config: &Configuration) -> Result<f64, TwinError> {
        let applier = &self.applier;
        let window = self.window;

        let costs: Vec<f64> = if self.twins.len() == 1 {
            vec![self.twins[0].run(0, applier, config, window)?]
        } else {
            let results: Vec<Result<f64, TwinError>> = std::thread::scope(|s| {
                let workers: Vec<_> = self.twins.iter_mut()
                    .enumerate()
                    .map(|(index, twin)| s.spawn(move || twin.run(index, applier, config, window)))
                    .collect();
                workers.into_iter()
                    .map(|w| w.join().unwrap_or(Err(TwinError::WorkerPanicked)))
                    .collect()
            });
            results.into_iter().collect::<Result<_, _>>()?
        };

        self.evaluations += 1;
        let mean = costs.iter().sum::<f64>() / costs.len() as f64;
        debug!("TWIN {} -> {:.1} (replicas {:?})", config, mean, costs);
        Ok(mean)
    }

    // DROPPING THE EVALUATOR CLOSES EVERY TWIN HANDLE
    pub fn close(self) {}
}
