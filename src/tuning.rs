// CYBERTWIN TUNING CONSTANTS
// PURE-RUST MODULE: ZERO ENGINE DEPENDENCIES
// SHARED BETWEEN THE CONTROL LOOP, THE CLI AND THE TESTS

use std::path::PathBuf;

use crate::model::Bounds;

// CLASSIFIER THRESHOLDS
// HALTING SUM ABOVE QUEUE_THRESHOLD MAKES AN AXIS CRITICAL.
// DENSITY RATIO BEYOND FLOW_RATIO_THRESHOLD MAKES MOVING TRAFFIC DIRECTIONAL.

pub const QUEUE_THRESHOLD: u32 = 10;
pub const FLOW_RATIO_THRESHOLD: f64 = 2.0;

// HYSTERESIS GATE
// A LABEL MUST HOLD FOR MIN_STABLE TICKS AND IS ONLY ACTED ON EVERY CHECK_EVERY TICKS.
// BELOW MIN_HALTED STOPPED VEHICLES THE RAW LABEL IS NOISE.

pub const CHECK_EVERY: u64 = 25;
pub const MIN_STABLE: u32 = 6;
pub const MIN_HALTED: u32 = 6;

// TWIN EVALUATION WINDOW (TICKS)

pub const WARMUP_STEPS: u32 = 30;
pub const MEASURE_STEPS: u32 = 100;

// REPLICATION SEEDS: SAME SEQUENCE FOR EVERY CANDIDATE IN AN EPISODE
pub const DEFAULT_SEEDS: [u64; 2] = [42, 43];

// SEARCH BUDGET

pub const POPULATION_SIZE: usize = 5;
pub const MAX_GENERATIONS: u32 = 5;
pub const MUTATION_RATE: f64 = 0.3;
pub const MUTATION_STEP: i32 = 10;

// GREEN DURATION BOUNDS (SECONDS): [AXIS A, AXIS B]
pub const GREEN_BOUNDS: [(i32, i32); 2] = [(15, 60), (15, 60)];

// LIVE SIGNAL PROGRAM AT STARTUP
pub const START_CONFIG: [i32; 2] = [30, 30];

// SCHEDULE POSITIONS OVERWRITTEN BY A CONFIGURATION, ONE PER GENE.
// SLOTS 1 AND 3 ARE YELLOW CLEARANCE AND ARE NEVER TOUCHED.
pub const CONTROLLED_SLOTS: [usize; 2] = [0, 2];

// TIMELINE
pub const SEGMENT_LENGTH: u64 = 200;
pub const CYCLE_COUNT: u32 = 3;
pub const TIMELINE_SEED: u64 = 42;

// BATCH MODE: TICKS OF CONSTANT DEMAND BEFORE THE SCENARIO IS CHECKPOINTED
pub const BATCH_WARMUP_TICKS: u64 = 150;

pub const KNOWLEDGE_FILE: &str = "knowledge.json";

// CONTROL CONFIGURATION
// EVERY FIELD DEFAULTS TO THE CONSTANT ABOVE; THE CLI OVERRIDES INDIVIDUAL FIELDS.

#[derive(Clone, Debug)]
pub struct ControlConfig {
    pub queue_threshold: u32,
    pub flow_ratio_threshold: f64,
    pub check_every: u64,
    pub min_stable: u32,
    pub min_halted: u32,
    pub warmup_steps: u32,
    pub measure_steps: u32,
    pub seeds: Vec<u64>,
    pub population_size: usize,
    pub max_generations: u32,
    pub mutation_rate: f64,
    pub mutation_step: i32,
    pub search_seed: u64,
    pub seed_from_cache: bool,
    pub bounds: Bounds,
    pub controlled_slots: Vec<usize>,
    pub start_config: Vec<i32>,
    pub checkpoint_dir: PathBuf,
    pub knowledge_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            queue_threshold: QUEUE_THRESHOLD,
            flow_ratio_threshold: FLOW_RATIO_THRESHOLD,
            check_every: CHECK_EVERY,
            min_stable: MIN_STABLE,
            min_halted: MIN_HALTED,
            warmup_steps: WARMUP_STEPS,
            measure_steps: MEASURE_STEPS,
            seeds: DEFAULT_SEEDS.to_vec(),
            population_size: POPULATION_SIZE,
            max_generations: MAX_GENERATIONS,
            mutation_rate: MUTATION_RATE,
            mutation_step: MUTATION_STEP,
            search_seed: 7,
            seed_from_cache: true,
            bounds: Bounds::green_default(),
            controlled_slots: CONTROLLED_SLOTS.to_vec(),
            start_config: START_CONFIG.to_vec(),
            checkpoint_dir: std::env::temp_dir().join("cybertwin"),
            knowledge_path: PathBuf::from(KNOWLEDGE_FILE),
        }
    }
}

// TELEMETRY GATING
// PRINT EVERY TICK WHILE A CHANGE IS PENDING, OTHERWISE ONCE PER CHECK INTERVAL.

pub fn should_print_telemetry(tick: u64, check_every: u64, change_pending: bool) -> bool {
    change_pending || check_every == 0 || tick % check_every == 0
}
