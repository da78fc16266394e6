// CYBERTWIN CONTROL LOOP
// ONE THREAD DRIVES THE LIVE ENGINE: STEP -> COLLECT -> CLASSIFY -> GATE.
// A GATE TRIGGER STARTS AN ADAPTATION EPISODE THAT RUNS TO COMPLETION BEFORE THE
// NEXT LIVE STEP:
//
//   MONITOR -> CHECKPOINTING -> SEARCHING -> APPLYING -> MONITOR
//
// CACHE HIT: APPLY THE CACHED CONFIGURATION, NO CHECKPOINT, NO TWINS.
// CACHE MISS: CHECKPOINT LIVE, OPEN TWINS, GENETIC SEARCH, RECORD, APPLY THE WINNER.
//
// FAILURE POLICY
//   TWIN FAILURE / CANCEL  EPISODE ABANDONED. LIVE CONFIG KEPT, CACHE UNTOUCHED,
//                          GATE ROLLED BACK SO THE NEXT CHECK TICK RETRIES.
//   LIVE FAILURE           FATAL. LIVE HANDLE CLOSED, ERROR PROPAGATED.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::apply::{Applier, ApplyError};
use crate::checkpoint::CheckpointManager;
use crate::classify::{classify, Classification, WorkloadLabel};
use crate::collector::collect;
use crate::engine::{Checkpoint, EngineError, Launcher, SimHandle};
use crate::event::{EventLog, Provenance, Snapshot, Source};
use crate::evolve::{seeded_population, GeneticBreeder, GeneticSearch, SearchError};
use crate::gate::HysteresisGate;
use crate::knowledge::KnowledgeCache;
use crate::model::{Candidate, Configuration};
use crate::tuning::{self, ControlConfig};
use crate::twin::{TwinEvaluator, Window};
use crate::workload::Timeline;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("live engine failure: {0}")]
    Engine(#[from] EngineError),
    #[error("live configuration failure: {0}")]
    Apply(#[from] ApplyError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Monitor,
    Checkpointing,
    Searching,
    Applying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    // FULL LOOP: DETECT AND ADAPT
    Adapt,
    // DETECTION LOGGING ONLY, THE LIVE PROGRAM IS NEVER CHANGED
    DetectOnly,
}

pub struct ControlLoop {
    config: ControlConfig,
    mode: Mode,
    live: Box<dyn SimHandle>,
    launcher: Box<dyn Launcher>,
    timeline: Option<Arc<Timeline>>,
    gate: HysteresisGate,
    checkpoints: CheckpointManager,
    knowledge: KnowledgeCache,
    applier: Applier,
    search: GeneticSearch<GeneticBreeder>,
    state: ControlState,
    current_config: Configuration,
    tick: u64,
    telemetry: bool,
    log: EventLog,
}

impl ControlLoop {
    // INSTALLS config.start_config ON THE LIVE HANDLE BEFORE THE FIRST TICK.
    // ANY SETUP FAILURE CLOSES THE LIVE HANDLE BEFORE RETURNING.
    pub fn new(
        config: ControlConfig,
        mode: Mode,
        mut live: Box<dyn SimHandle>,
        launcher: Box<dyn Launcher>,
        timeline: Option<Arc<Timeline>>,
    ) -> Result<Self, ControlError> {
        let parts = Applier::new(config.bounds.clone(), config.controlled_slots.clone())
            .map_err(ControlError::from)
            .and_then(|applier| Ok((applier, CheckpointManager::new(&config.checkpoint_dir)?)));
        let (applier, checkpoints) = match parts {
            Ok(parts) => parts,
            Err(e) => {
                let _ = live.close();
                return Err(e);
            }
        };
        let knowledge = KnowledgeCache::open(&config.knowledge_path);
        let search = GeneticSearch::new(GeneticBreeder::new(
            config.search_seed,
            config.mutation_rate,
            config.mutation_step,
        ));
        let gate = HysteresisGate::new(config.check_every, config.min_stable, config.min_halted);

        let start = Configuration::new(config.start_config.clone());
        let current_config = match applier.apply(live.as_mut(), &start) {
            Ok(installed) => installed,
            Err(e) => {
                let _ = live.close();
                return Err(e.into());
            }
        };
        info!("LIVE START CONFIG {} ({:?})", current_config, mode);

        Ok(Self {
            config,
            mode,
            live,
            launcher,
            timeline,
            gate,
            checkpoints,
            knowledge,
            applier,
            search,
            state: ControlState::Monitor,
            current_config,
            tick: 0,
            telemetry: false,
            log: EventLog::new(),
        })
    }

    pub fn set_telemetry(&mut self, on: bool) {
        self.telemetry = on;
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn current_config(&self) -> &Configuration {
        &self.current_config
    }

    pub fn gate(&self) -> &HysteresisGate {
        &self.gate
    }

    pub fn knowledge(&self) -> &KnowledgeCache {
        &self.knowledge
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn provenance(&self) -> &[Provenance] {
        self.log.episodes()
    }

    // CLOSE THE LIVE HANDLE AND HAND BACK THE ERROR
    fn fail(&mut self, e: impl Into<ControlError>) -> ControlError {
        let e = e.into();
        warn!("LIVE FAILURE AT t={}: {}", self.tick, e);
        if let Err(close) = self.live.close() {
            warn!("LIVE CLOSE FAILED: {}", close);
        }
        self.state = ControlState::Monitor;
        e
    }

    fn observe_live(&mut self) -> Result<Classification, ControlError> {
        let state = match collect(self.live.as_mut()) {
            Ok(state) => state,
            Err(e) => return Err(self.fail(e)),
        };
        Ok(classify(
            &state.halting,
            &state.density,
            self.config.queue_threshold,
            self.config.flow_ratio_threshold,
        ))
    }

    // ONE LIVE STEP. RETURNS THE PROVENANCE WHEN THIS TICK CHANGED THE LIVE PROGRAM.
    pub fn tick(&mut self, shutdown: &AtomicBool) -> Result<Option<Provenance>, ControlError> {
        if let Err(e) = self.live.step() {
            return Err(self.fail(e));
        }
        let t = self.tick;
        self.tick += 1;

        let c = self.observe_live()?;
        let previous = self.gate.current();
        let detected = self.gate.effective_label(&c);
        let trigger = self.gate.observe(&c, t);

        let actual = self.timeline.as_ref().map(|tl| tl.actual_label(t).to_string());
        if self.telemetry
            && tuning::should_print_telemetry(t, self.config.check_every, self.gate.change_pending())
        {
            println!(
                "[MON] t={:<6} actual: {:<10} detected: {:<20} halt: A={:<3} B={:<3} dens: A={:<3} B={:<3} ratio: {:<5.2} stable: {} config: {}",
                t, actual.as_deref().unwrap_or("-"), detected.as_str(),
                c.halting.0, c.halting.1, c.density.0, c.density.1,
                c.ratio, self.gate.stable_count(), self.current_config,
            );
        }
        self.log.snapshot(Snapshot {
            tick: t,
            halting: c.halting,
            density: c.density,
            detected,
            actual,
            config: self.current_config.clone(),
        });

        let Some(label) = trigger else {
            return Ok(None);
        };
        info!("WORKLOAD CHANGE AT t={}: {} -> {}",
              t, previous.map(|l| l.as_str()).unwrap_or("-"), label);

        if self.mode == Mode::DetectOnly {
            return Ok(None);
        }

        match self.adapt(label, t, shutdown, true)? {
            Some(provenance) => {
                self.log.episode(provenance.clone());
                Ok(Some(provenance))
            }
            None => {
                self.gate.revert(previous);
                self.log.abandon();
                Ok(None)
            }
        }
    }

    // RUNS UNTIL shutdown IS SET OR max_ticks LIVE STEPS HAVE BEEN TAKEN
    pub fn run(&mut self, max_ticks: Option<u64>, shutdown: &AtomicBool) -> Result<(), ControlError> {
        while !shutdown.load(Ordering::Relaxed) {
            if max_ticks.is_some_and(|max| self.tick >= max) {
                break;
            }
            self.tick(shutdown)?;
        }
        info!("CONTROL LOOP STOPPED AFTER {} TICKS, CONFIG {}", self.tick, self.current_config);
        Ok(())
    }

    // STEP THE LIVE ENGINE WITHOUT CLASSIFYING OR LOGGING
    pub fn warm_up(&mut self, ticks: u64) -> Result<(), ControlError> {
        for _ in 0..ticks {
            if let Err(e) = self.live.step() {
                return Err(self.fail(e));
            }
            self.tick += 1;
        }
        Ok(())
    }

    // CLASSIFY THE LIVE STATE NOW AND SEARCH FOR IT, BYPASSING GATE AND CACHE LOOKUP.
    // USED BY BATCH MODE. None: EPISODE ABANDONED.
    pub fn force_episode(&mut self, cancel: &AtomicBool) -> Result<Option<Provenance>, ControlError> {
        let c = self.observe_live()?;
        let provenance = self.adapt(c.label, self.tick, cancel, false)?;
        match &provenance {
            Some(p) => self.log.episode(p.clone()),
            None => self.log.abandon(),
        }
        Ok(provenance)
    }

    // Ok(None): EPISODE ABANDONED, NOTHING CHANGED. Err: LIVE HANDLE FAILED.
    fn adapt(
        &mut self,
        label: WorkloadLabel,
        tick: u64,
        cancel: &AtomicBool,
        use_cache: bool,
    ) -> Result<Option<Provenance>, ControlError> {
        if use_cache {
            if let Some(entry) = self.knowledge.lookup(label).cloned() {
                info!("KNOWLEDGE HIT {} -> {} (cost {:.1})", label, entry.configuration, entry.cost);
                let installed = self.install(&entry.configuration)?;
                return Ok(Some(Provenance {
                    tick,
                    label,
                    configuration: installed,
                    cost: entry.cost,
                    source: Source::Cache,
                    evaluations: 0,
                }));
            }
        }

        self.state = ControlState::Checkpointing;
        let checkpoint = match self.checkpoints.capture(self.live.as_mut(), label.as_str()) {
            Ok(cp) => cp,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = ControlState::Searching;
        let result = self.search_episode(label, &checkpoint, cancel);
        self.checkpoints.discard(&checkpoint);

        let (best, evaluations) = match result {
            Ok(found) => found,
            Err(e) => {
                warn!("EPISODE {} AT t={} ABANDONED: {}", label, tick, e);
                self.state = ControlState::Monitor;
                return Ok(None);
            }
        };

        if let Err(e) = self.knowledge.record(label, best.configuration.clone(), best.cost) {
            warn!("KNOWLEDGE PERSIST FAILED: {}", e);
        }

        let installed = self.install(&best.configuration)?;
        info!("EPISODE {} AT t={}: APPLIED {} cost {:.1} ({} evaluations)",
              label, tick, installed, best.cost, evaluations);
        Ok(Some(Provenance {
            tick,
            label,
            configuration: installed,
            cost: best.cost,
            source: Source::Search,
            evaluations,
        }))
    }

    fn install(&mut self, config: &Configuration) -> Result<Configuration, ControlError> {
        self.state = ControlState::Applying;
        let installed = match self.applier.apply(self.live.as_mut(), config) {
            Ok(installed) => installed,
            Err(e) => return Err(self.fail(e)),
        };
        self.current_config = installed.clone();
        self.state = ControlState::Monitor;
        Ok(installed)
    }

    // TWINS LIVE ONLY FOR THIS EPISODE AND ARE CLOSED ON EVERY PATH
    fn search_episode(
        &mut self,
        label: WorkloadLabel,
        checkpoint: &Checkpoint,
        cancel: &AtomicBool,
    ) -> Result<(Candidate, u64), SearchError> {
        let replicas = self.checkpoints.replicate(checkpoint, &self.config.seeds);
        let window = Window { warmup: self.config.warmup_steps, measure: self.config.measure_steps };
        let mut twins = TwinEvaluator::open(self.launcher.as_ref(), replicas, self.applier.clone(), window)?;

        let seeds = if self.config.seed_from_cache {
            self.knowledge.others(label)
        } else {
            Vec::new()
        };
        let bounds = self.config.bounds.clone();
        let (initial, seeded) = seeded_population(
            self.search.breeder_mut(),
            &bounds,
            self.config.population_size,
            &seeds,
        );
        info!("EPISODE {}: {} TWINS, POP {} ({} FROM CACHE), {} GENS",
              label, twins.replicas(), initial.len(), seeded,
              self.config.max_generations);

        let outcome = self.search.run(
            initial,
            &bounds,
            self.config.max_generations,
            |c| twins.evaluate(c),
            cancel,
        );
        let evaluations = twins.evaluations();
        twins.close();
        Ok((outcome?.best, evaluations))
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        let _ = self.live.close();
    }
}

// --- BATCH MODE ---

#[derive(Clone, Debug)]
pub struct BatchResult {
    pub scenario: String,
    pub label: Option<WorkloadLabel>,
    pub provenance: Option<Provenance>,
}

// ONE FRESH LIVE ENGINE PER SCENARIO UNDER CONSTANT DEMAND: WARM UP, CLASSIFY,
// CHECKPOINT, SEARCH, RECORD. make_launcher BUILDS THE LAUNCHER FOR ONE TIMELINE.
pub fn batch<F>(
    config: &ControlConfig,
    scenarios: &[&str],
    warmup_ticks: u64,
    live_seed: Option<u64>,
    make_launcher: F,
    cancel: &AtomicBool,
) -> anyhow::Result<Vec<BatchResult>>
where
    F: Fn(Arc<Timeline>) -> Box<dyn Launcher>,
{
    let mut results = Vec::with_capacity(scenarios.len());
    for &name in scenarios {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let timeline = Arc::new(Timeline::constant(name)?);
        let launcher = make_launcher(timeline.clone());
        let live = launcher.launch(live_seed)?;
        let mut ctl = ControlLoop::new(config.clone(), Mode::Adapt, live, launcher, Some(timeline))?;

        ctl.warm_up(warmup_ticks)?;
        let provenance = ctl.force_episode(cancel)?;
        let label = provenance.as_ref().map(|p| p.label);
        info!("BATCH {}: {}", name, match &provenance {
            Some(p) => format!("{} -> {} cost {:.1}", p.label, p.configuration, p.cost),
            None => "ABANDONED".to_string(),
        });
        results.push(BatchResult { scenario: name.to_string(), label, provenance });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Schedule;
    use crate::sim::{IntersectionLauncher, YELLOW_SECS};

    fn setup(dir: &std::path::Path, scenario: &str, mode: Mode) -> ControlLoop {
        let mut config = ControlConfig::default();
        config.checkpoint_dir = dir.join("cp");
        config.knowledge_path = dir.join("knowledge.json");
        config.population_size = 3;
        config.max_generations = 2;
        config.warmup_steps = 5;
        config.measure_steps = 20;
        let timeline = Arc::new(Timeline::constant(scenario).unwrap());
        let launcher = IntersectionLauncher::new(timeline.clone(), Schedule::four_phase(30, 30, YELLOW_SECS));
        let live = launcher.launch(Some(1)).unwrap();
        ControlLoop::new(config, mode, live, Box::new(launcher), Some(timeline)).unwrap()
    }

    #[test]
    fn detect_only_never_changes_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = setup(dir.path(), "NS_Heavy", Mode::DetectOnly);
        ctl.run(Some(300), &AtomicBool::new(false)).unwrap();
        assert_eq!(ctl.ticks(), 300);
        assert_eq!(ctl.current_config().genes(), &[30, 30]);
        assert!(ctl.provenance().is_empty());
        assert!(ctl.gate().current().is_some());
        assert_eq!(ctl.log().len(), 300);
    }

    #[test]
    fn cancelled_episode_keeps_config_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = setup(dir.path(), "NS_Heavy", Mode::Adapt);
        ctl.warm_up(100).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(ctl.force_episode(&cancel).unwrap().is_none());
        assert_eq!(ctl.current_config().genes(), &[30, 30]);
        assert!(ctl.knowledge().is_empty());
        assert_eq!(ctl.log().abandoned(), 1);
        assert_eq!(ctl.state(), ControlState::Monitor);
    }

    #[test]
    fn forced_episode_records_and_applies_winner() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = setup(dir.path(), "NS_Heavy", Mode::Adapt);
        ctl.warm_up(100).unwrap();
        let p = ctl.force_episode(&AtomicBool::new(false)).unwrap().unwrap();
        assert_eq!(p.source, Source::Search);
        assert_eq!(p.evaluations, 6);
        assert_eq!(ctl.current_config(), &p.configuration);
        assert_eq!(ctl.knowledge().lookup(p.label).unwrap().configuration, p.configuration);
        // CHECKPOINT FILE REMOVED AFTER THE EPISODE
        assert_eq!(std::fs::read_dir(dir.path().join("cp")).unwrap().count(), 0);
    }
}
