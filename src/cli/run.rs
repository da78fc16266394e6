use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use cybertwin::control::{ControlLoop, Mode};
use cybertwin::engine::Launcher;
use cybertwin::sim::IntersectionLauncher;
use cybertwin::tuning;
use cybertwin::workload::Timeline;

use super::{base_schedule, print_config, ControlArgs};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    // EXPLICIT SCENARIO SEQUENCE, ONE SEGMENT EACH (DEFAULT: RANDOM CYCLING)
    #[arg(long, value_delimiter = ',')]
    pub scenarios: Vec<String>,

    #[arg(long, default_value_t = tuning::SEGMENT_LENGTH)]
    pub segment_length: u64,

    #[arg(long, default_value_t = tuning::CYCLE_COUNT)]
    pub cycles: u32,

    #[arg(long, default_value_t = tuning::TIMELINE_SEED)]
    pub timeline_seed: u64,

    // LIVE ENGINE SEED (DEFAULT: ENGINE DEFAULT SEED)
    #[arg(long)]
    pub live_seed: Option<u64>,

    // STOP AFTER N TICKS (DEFAULT: END OF TIMELINE)
    #[arg(long)]
    pub ticks: Option<u64>,

    // NO PER-TICK MONITOR LINES
    #[arg(long)]
    pub quiet: bool,

    // DUMP FULL EVENT LOG ON EXIT
    #[arg(long)]
    pub dump_log: bool,
}

impl RunArgs {
    fn timeline(&self) -> Result<Timeline> {
        let timeline = if self.scenarios.is_empty() {
            Timeline::random_cycling(self.segment_length, self.cycles, self.timeline_seed)?
        } else {
            Timeline::from_names(&self.scenarios, self.segment_length, 0)?
        };
        Ok(timeline)
    }
}

pub fn run_live(args: &RunArgs, mode: Mode, shutdown: &AtomicBool) -> Result<()> {
    let config = args.control.control_config()?;
    let timeline = Arc::new(args.timeline()?);
    let ticks = args.ticks.unwrap_or(timeline.end());

    println!("MODE:            {}", match mode {
        Mode::Adapt => "RUN (DETECT + ADAPT)",
        Mode::DetectOnly => "DETECT ONLY",
    });
    println!("TIMELINE:        {}", timeline.segments().iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" -> "));
    println!("TICKS:           {}", ticks);
    print_config(&config);
    println!();

    let launcher = IntersectionLauncher::new(timeline.clone(), base_schedule());
    let live = launcher.launch(args.live_seed)?;
    let mut ctl = ControlLoop::new(config, mode, live, Box::new(launcher), Some(timeline))?;
    ctl.set_telemetry(!args.quiet);

    println!("CYBERTWIN IS ACTIVE (CTRL+C TO EXIT)");
    ctl.run(Some(ticks), shutdown)?;
    println!("CYBERTWIN IS SHUTTING DOWN");

    if args.dump_log {
        ctl.log().dump();
    }
    ctl.log().summary();
    Ok(())
}
