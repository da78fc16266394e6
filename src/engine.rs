// CYBERTWIN ENGINE BOUNDARY
// THE SIMULATION ENGINE IS A BLACK BOX BEHIND A REQUEST/RESPONSE CONTROL PROTOCOL.
// EVERY CALL TAKES &mut SELF: A TRANSPORT-BACKED HANDLE OWNS ITS CONNECTION.
//
// ONE LIVE HANDLE IS OWNED BY THE CONTROL LOOP. TWIN HANDLES ARE LAUNCHED PER
// EPISODE AND NEVER SHARE STATE WITH THE LIVE HANDLE.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::StateVector;

pub type EntityId = u64;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine connection closed")]
    Closed,
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

// --- SIGNAL SCHEDULE ---

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub duration: u32,
    pub state: String,
}

impl Phase {
    pub fn new(duration: u32, state: &str) -> Self {
        Self { duration, state: state.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub phases: Vec<Phase>,
}

impl Schedule {
    // A GREEN / A YELLOW / B GREEN / B YELLOW. STATE STRINGS LIST SIGNALS FOR N, S, E, W.
    pub fn four_phase(green_a: u32, green_b: u32, yellow: u32) -> Self {
        Self {
            phases: vec![
                Phase::new(green_a, "GGrr"),
                Phase::new(yellow, "yyrr"),
                Phase::new(green_b, "rrGG"),
                Phase::new(yellow, "rryy"),
            ],
        }
    }

    pub fn cycle_length(&self) -> u32 {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

// --- CHECKPOINT ---

// OPAQUE TO THE CORE: ONLY THE ENGINE THAT WROTE THE FILE CAN READ IT BACK
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    path: PathBuf,
    time: u64,
}

impl Checkpoint {
    pub fn new(path: PathBuf, time: u64) -> Self {
        Self { path, time }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn time(&self) -> u64 {
        self.time
    }
}

// --- HANDLE ---

pub trait SimHandle: Send {
    // ADVANCE ONE SIMULATED SECOND
    fn step(&mut self) -> Result<(), EngineError>;

    fn time(&mut self) -> Result<u64, EngineError>;

    fn state(&mut self) -> Result<StateVector, EngineError>;

    // CUMULATIVE WAITING TIME OF EVERY ENTITY CURRENTLY IN THE SIMULATION
    fn accumulated_waits(&mut self) -> Result<HashMap<EntityId, f64>, EngineError>;

    fn schedule(&mut self) -> Result<Schedule, EngineError>;

    // INSTALLS THE WHOLE PROGRAM IN ONE CALL: NO PARTIAL SCHEDULE IS EVER VISIBLE
    fn set_schedule(&mut self, schedule: Schedule) -> Result<(), EngineError>;

    fn save_snapshot(&mut self, path: &Path) -> Result<Checkpoint, EngineError>;

    fn load_snapshot(&mut self, checkpoint: &Checkpoint) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;
}

// STARTS FRESH, INDEPENDENT HANDLES (TWINS). SEEDED HANDLES REPLAY DETERMINISTICALLY.
pub trait Launcher: Sync {
    fn launch(&self, seed: Option<u64>) -> Result<Box<dyn SimHandle>, EngineError>;
}
