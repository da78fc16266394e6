// CYBERTWIN CLI SUBCOMMANDS
// SHARED CONTROL OVERRIDES: EVERY FLAG DEFAULTS TO ITS tuning.rs CONSTANT.

pub mod batch;
pub mod run;
pub mod show;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use cybertwin::engine::Schedule;
use cybertwin::model::Bounds;
use cybertwin::sim::YELLOW_SECS;
use cybertwin::tuning::{self, ControlConfig};

#[derive(Args, Clone, Debug)]
pub struct ControlArgs {
    // KNOWLEDGE CACHE FILE (JSON, CREATED ON FIRST RECORD)
    #[arg(long, default_value = tuning::KNOWLEDGE_FILE)]
    pub knowledge: PathBuf,

    // CHECKPOINT DIRECTORY (DEFAULT: $TMPDIR/cybertwin)
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    // REPLICATION SEEDS, COMMA SEPARATED
    #[arg(long, value_delimiter = ',', default_values_t = tuning::DEFAULT_SEEDS.to_vec())]
    pub seeds: Vec<u64>,

    // EVALUATE ONE REPLICA ON THE ENGINE DEFAULT SEED INSTEAD OF --seeds
    #[arg(long)]
    pub unseeded: bool,

    // GREEN BOUNDS PER SLOT AS lo:hi, COMMA SEPARATED (15:60,15:60)
    #[arg(long, value_delimiter = ',', value_parser = parse_bound)]
    pub bounds: Vec<(i32, i32)>,

    // LIVE PROGRAM AT STARTUP, ONE GREEN PER SLOT
    #[arg(long, value_delimiter = ',', default_values_t = tuning::START_CONFIG.to_vec())]
    pub start: Vec<i32>,

    #[arg(long, default_value_t = tuning::POPULATION_SIZE)]
    pub population: usize,

    #[arg(long, default_value_t = tuning::MAX_GENERATIONS)]
    pub generations: u32,

    #[arg(long, default_value_t = tuning::WARMUP_STEPS)]
    pub warmup: u32,

    #[arg(long, default_value_t = tuning::MEASURE_STEPS)]
    pub measure: u32,

    #[arg(long, default_value_t = tuning::CHECK_EVERY)]
    pub check_every: u64,

    #[arg(long, default_value_t = tuning::MIN_STABLE)]
    pub min_stable: u32,

    #[arg(long, default_value_t = tuning::MIN_HALTED)]
    pub min_halted: u32,

    #[arg(long, default_value_t = tuning::QUEUE_THRESHOLD)]
    pub queue_threshold: u32,

    #[arg(long, default_value_t = tuning::FLOW_RATIO_THRESHOLD)]
    pub flow_ratio: f64,

    // BREEDER RNG SEED
    #[arg(long, default_value_t = 7)]
    pub search_seed: u64,

    // DO NOT SEED INITIAL POPULATIONS FROM OTHER LABELS' CACHED CONFIGS
    #[arg(long)]
    pub no_seed: bool,
}

fn parse_bound(s: &str) -> Result<(i32, i32), String> {
    let (lo, hi) = s.split_once(':').ok_or_else(|| format!("expected lo:hi, got {:?}", s))?;
    let lo = lo.trim().parse::<i32>().map_err(|e| format!("{}: {}", lo, e))?;
    let hi = hi.trim().parse::<i32>().map_err(|e| format!("{}: {}", hi, e))?;
    Ok((lo, hi))
}

impl ControlArgs {
    pub fn control_config(&self) -> Result<ControlConfig> {
        let defaults = ControlConfig::default();
        let bounds = if self.bounds.is_empty() {
            defaults.bounds.clone()
        } else {
            Bounds::new(self.bounds.clone())?
        };
        if self.start.len() != bounds.dims() {
            bail!("--start has {} genes, bounds have {}", self.start.len(), bounds.dims());
        }
        if self.population == 0 {
            bail!("--population must be positive");
        }

        Ok(ControlConfig {
            queue_threshold: self.queue_threshold,
            flow_ratio_threshold: self.flow_ratio,
            check_every: self.check_every,
            min_stable: self.min_stable,
            min_halted: self.min_halted,
            warmup_steps: self.warmup,
            measure_steps: self.measure,
            seeds: if self.unseeded { Vec::new() } else { self.seeds.clone() },
            population_size: self.population,
            max_generations: self.generations,
            search_seed: self.search_seed,
            seed_from_cache: !self.no_seed,
            bounds,
            start_config: self.start.clone(),
            checkpoint_dir: self.checkpoint_dir.clone().unwrap_or(defaults.checkpoint_dir.clone()),
            knowledge_path: self.knowledge.clone(),
            ..defaults
        })
    }
}

// BASE PROGRAM FOR EVERY ENGINE: THE CONTROL LOOP INSTALLS THE START CONFIG ON TOP
pub fn base_schedule() -> Schedule {
    let [a, b] = tuning::START_CONFIG;
    Schedule::four_phase(a as u32, b as u32, YELLOW_SECS)
}

pub fn print_config(config: &ControlConfig) {
    println!("BOUNDS:          {:?}", config.bounds.intervals());
    println!("START CONFIG:    {:?}", config.start_config);
    println!("SEEDS:           {:?}", config.seeds);
    println!("SEARCH:          pop={} gens={} warmup={} measure={}",
             config.population_size, config.max_generations,
             config.warmup_steps, config.measure_steps);
    println!("GATE:            check_every={} min_stable={} min_halted={}",
             config.check_every, config.min_stable, config.min_halted);
    println!("KNOWLEDGE:       {}", config.knowledge_path.display());
}
