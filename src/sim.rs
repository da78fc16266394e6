// CYBERTWIN REFERENCE ENGINE
// MINIMAL SIGNALISED INTERSECTION BEHIND THE SimHandle BOUNDARY.
// STANDS IN FOR AN EXTERNAL ENGINE SO THE LOOP RUNS (AND IS TESTED) OFFLINE.
//
// FOUR APPROACH LANES: N, S (AXIS A) AND E, W (AXIS B). EACH LANE IS A ROW OF
// LANE_CELLS CELLS; CELL 0 IS THE STOP LINE. PER TICK, FRONT TO BACK:
//   - VEHICLE AT THE STOP LINE CLEARS ON GREEN WITH PROBABILITY DISCHARGE_PROB
//   - OTHERS ADVANCE ONE CELL IF FREE, UNLESS THEY DAWDLE (DAWDLE_PROB)
//   - A VEHICLE THAT DID NOT MOVE IS HALTING AND ACCRUES ONE SECOND OF WAIT
// ARRIVALS FOLLOW THE TIMELINE'S PER-LANE PROBABILITIES.
//
// SNAPSHOTS ARE GZIPPED JSON. LOADING A SNAPSHOT RESEEDS THE RNG FROM
// (HANDLE SEED, SNAPSHOT TIME): SAME SEED + SAME SNAPSHOT = SAME FUTURE.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{Checkpoint, EngineError, EntityId, Launcher, Schedule, SimHandle};
use crate::model::StateVector;
use crate::workload::Timeline;

pub const LANES: usize = 4;
pub const LANE_CELLS: u32 = 60;
pub const YELLOW_SECS: u32 = 3;

const DAWDLE_PROB: f64 = 0.1;
const DISCHARGE_PROB: f64 = 0.9;

// ENGINE DEFAULT WHEN NO SEED IS GIVEN
const DEFAULT_SEED: u64 = 23423;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Vehicle {
    id: EntityId,
    pos: u32,
    waited: f64,
    halted: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    time: u64,
    next_id: EntityId,
    lanes: Vec<Vec<Vehicle>>,
    schedule: Schedule,
    phase: usize,
    phase_elapsed: u32,
}

pub struct Intersection {
    timeline: Arc<Timeline>,
    seed: u64,
    rng: StdRng,
    time: u64,
    next_id: EntityId,
    // SORTED BY pos ASCENDING: FRONT OF THE QUEUE FIRST
    lanes: Vec<Vec<Vehicle>>,
    schedule: Schedule,
    phase: usize,
    phase_elapsed: u32,
    closed: bool,
}

fn mix_seed(seed: u64, time: u64) -> u64 {
    seed ^ time.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl Intersection {
    pub fn new(timeline: Arc<Timeline>, schedule: Schedule, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or(DEFAULT_SEED);
        Self {
            timeline,
            seed,
            rng: StdRng::seed_from_u64(mix_seed(seed, 0)),
            time: 0,
            next_id: 0,
            lanes: vec![Vec::new(); LANES],
            schedule,
            phase: 0,
            phase_elapsed: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    fn lane_green(&self, lane: usize) -> bool {
        self.schedule.phases.get(self.phase)
            .and_then(|p| p.state.as_bytes().get(lane))
            .map(|&c| c == b'G' || c == b'g')
            .unwrap_or(false)
    }

    fn move_lane(&mut self, lane: usize) {
        let green = self.lane_green(lane);
        let vehicles = std::mem::take(&mut self.lanes[lane]);
        let mut kept: Vec<Vehicle> = Vec::with_capacity(vehicles.len());

        for mut v in vehicles {
            let ahead = kept.last().map(|a| a.pos);
            let moved = if v.pos == 0 {
                if green && self.rng.random_bool(DISCHARGE_PROB) {
                    continue; // CLEARED THE INTERSECTION
                }
                false
            } else if ahead.map_or(true, |a| v.pos - 1 > a) {
                if self.rng.random_bool(DAWDLE_PROB) {
                    false
                } else {
                    v.pos -= 1;
                    true
                }
            } else {
                false
            };

            v.halted = !moved;
            if v.halted {
                v.waited += 1.0;
            }
            kept.push(v);
        }

        self.lanes[lane] = kept;
    }

    fn arrive(&mut self, lane: usize, prob: f64) {
        if prob <= 0.0 || !self.rng.random_bool(prob.min(1.0)) {
            return;
        }
        let entry = LANE_CELLS - 1;
        // ENTRY CELL OCCUPIED: DEMAND IS LOST, AS WITH A FULL INSERTION QUEUE
        if self.lanes[lane].last().is_some_and(|v| v.pos >= entry) {
            return;
        }
        self.lanes[lane].push(Vehicle { id: self.next_id, pos: entry, waited: 0.0, halted: false });
        self.next_id += 1;
    }

    fn advance_signal(&mut self) {
        let n = self.schedule.phases.len();
        if n == 0 {
            return;
        }
        self.phase_elapsed += 1;
        if self.phase_elapsed < self.schedule.phases[self.phase].duration {
            return;
        }
        self.phase_elapsed = 0;
        // SKIP ZERO-LENGTH PHASES, AT MOST ONE FULL CYCLE
        for _ in 0..n {
            self.phase = (self.phase + 1) % n;
            if self.schedule.phases[self.phase].duration > 0 {
                break;
            }
        }
    }

    pub fn vehicles(&self) -> usize {
        self.lanes.iter().map(|l| l.len()).sum()
    }
}

impl SimHandle for Intersection {
    fn step(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        for lane in 0..LANES {
            self.move_lane(lane);
        }
        let (prob_a, prob_b) = self.timeline.arrival_probs(self.time);
        for lane in 0..LANES {
            let prob = if lane < LANES / 2 { prob_a } else { prob_b };
            self.arrive(lane, prob);
        }
        self.advance_signal();
        self.time += 1;
        Ok(())
    }

    fn time(&mut self) -> Result<u64, EngineError> {
        self.ensure_open()?;
        Ok(self.time)
    }

    fn state(&mut self) -> Result<StateVector, EngineError> {
        self.ensure_open()?;
        let halting = self.lanes.iter()
            .map(|l| l.iter().filter(|v| v.halted).count() as u32)
            .collect();
        let density = self.lanes.iter().map(|l| l.len() as u32).collect();
        Ok(StateVector::new(halting, density))
    }

    fn accumulated_waits(&mut self) -> Result<HashMap<EntityId, f64>, EngineError> {
        self.ensure_open()?;
        Ok(self.lanes.iter().flatten().map(|v| (v.id, v.waited)).collect())
    }

    fn schedule(&mut self) -> Result<Schedule, EngineError> {
        self.ensure_open()?;
        Ok(self.schedule.clone())
    }

    fn set_schedule(&mut self, schedule: Schedule) -> Result<(), EngineError> {
        self.ensure_open()?;
        if schedule.phases.is_empty() {
            return Err(EngineError::Protocol("empty signal program".to_string()));
        }
        // KEEP THE RUNNING PHASE, RESTART ITS TIMER IF THE NEW PROGRAM IS SHORTER
        self.phase %= schedule.phases.len();
        if self.phase_elapsed >= schedule.phases[self.phase].duration {
            self.phase_elapsed = 0;
        }
        self.schedule = schedule;
        Ok(())
    }

    fn save_snapshot(&mut self, path: &Path) -> Result<Checkpoint, EngineError> {
        self.ensure_open()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let snap = Snapshot {
            time: self.time,
            next_id: self.next_id,
            lanes: self.lanes.clone(),
            schedule: self.schedule.clone(),
            phase: self.phase,
            phase_elapsed: self.phase_elapsed,
        };
        let file = BufWriter::new(File::create(path)?);
        let mut enc = GzEncoder::new(file, Compression::fast());
        serde_json::to_writer(&mut enc, &snap).map_err(|e| EngineError::Snapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        enc.finish()?;
        Ok(Checkpoint::new(path.to_path_buf(), self.time))
    }

    fn load_snapshot(&mut self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        self.ensure_open()?;
        let path = checkpoint.path();
        let file = BufReader::new(File::open(path)?);
        let snap: Snapshot = serde_json::from_reader(GzDecoder::new(file)).map_err(|e| {
            EngineError::Snapshot { path: path.to_path_buf(), reason: e.to_string() }
        })?;
        if snap.lanes.len() != LANES {
            return Err(EngineError::Snapshot {
                path: path.to_path_buf(),
                reason: format!("{} lanes, expected {}", snap.lanes.len(), LANES),
            });
        }
        self.time = snap.time;
        self.next_id = snap.next_id;
        self.lanes = snap.lanes;
        self.schedule = snap.schedule;
        self.phase = snap.phase;
        self.phase_elapsed = snap.phase_elapsed;
        self.rng = StdRng::seed_from_u64(mix_seed(self.seed, snap.time));
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        Ok(())
    }
}

// TWINS SHARE THE LIVE TIMELINE (SAME DEMAND FILE) BUT NOTHING ELSE
#[derive(Clone)]
pub struct IntersectionLauncher {
    timeline: Arc<Timeline>,
    schedule: Schedule,
}

impl IntersectionLauncher {
    pub fn new(timeline: Arc<Timeline>, schedule: Schedule) -> Self {
        Self { timeline, schedule }
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }
}

impl Launcher for IntersectionLauncher {
    fn launch(&self, seed: Option<u64>) -> Result<Box<dyn SimHandle>, EngineError> {
        Ok(Box::new(Intersection::new(self.timeline.clone(), self.schedule.clone(), seed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heavy_a() -> Intersection {
        let timeline = Arc::new(Timeline::constant("NS_Heavy").unwrap());
        Intersection::new(timeline, Schedule::four_phase(15, 60, YELLOW_SECS), Some(1))
    }

    #[test]
    fn queues_build_on_red() {
        let mut sim = heavy_a();
        for _ in 0..200 {
            sim.step().unwrap();
        }
        let s = sim.state().unwrap();
        assert_eq!(s.halting.len(), LANES);
        assert!(s.density.iter().sum::<u32>() > 0);
        assert!(sim.time().unwrap() == 200);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let mut a = heavy_a();
        let mut b = heavy_a();
        for _ in 0..150 {
            a.step().unwrap();
            b.step().unwrap();
        }
        assert_eq!(a.state().unwrap(), b.state().unwrap());
        assert_eq!(a.accumulated_waits().unwrap(), b.accumulated_waits().unwrap());
    }

    #[test]
    fn closed_handle_refuses_calls() {
        let mut sim = heavy_a();
        sim.close().unwrap();
        assert!(matches!(sim.step(), Err(EngineError::Closed)));
        assert!(matches!(sim.state(), Err(EngineError::Closed)));
    }

    #[test]
    fn signal_cycles_through_phases() {
        let timeline = Arc::new(Timeline::constant("Balanced").unwrap());
        let mut sim = Intersection::new(timeline, Schedule::four_phase(2, 2, 1), None);
        let mut phases = Vec::new();
        for _ in 0..6 {
            phases.push(sim.phase);
            sim.step().unwrap();
        }
        assert_eq!(phases, vec![0, 0, 1, 2, 2, 3]);
    }

    #[test]
    fn corrupt_snapshot_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json.gz");
        std::fs::write(&path, b"not gzip").unwrap();
        let mut sim = heavy_a();
        let err = sim.load_snapshot(&Checkpoint::new(path, 0)).unwrap_err();
        assert!(matches!(err, EngineError::Snapshot { .. }));
    }
}
