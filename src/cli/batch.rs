use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;

use cybertwin::control;
use cybertwin::engine::Launcher;
use cybertwin::sim::IntersectionLauncher;
use cybertwin::tuning;
use cybertwin::workload::{self, Timeline, SCENARIOS};

use super::{base_schedule, print_config, ControlArgs};

#[derive(Args, Clone, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    // SCENARIOS TO EVALUATE (DEFAULT: ALL KNOWN)
    #[arg(long, value_delimiter = ',')]
    pub scenarios: Vec<String>,

    // CONSTANT-DEMAND TICKS BEFORE EACH SCENARIO IS CHECKPOINTED
    #[arg(long, default_value_t = tuning::BATCH_WARMUP_TICKS)]
    pub warmup_ticks: u64,

    #[arg(long, default_value_t = tuning::TIMELINE_SEED)]
    pub live_seed: u64,
}

pub fn run_batch(args: &BatchArgs, shutdown: &AtomicBool) -> Result<()> {
    let config = args.control.control_config()?;
    let names: Vec<&str> = if args.scenarios.is_empty() {
        SCENARIOS.iter().map(|s| s.name).collect()
    } else {
        args.scenarios.iter().map(String::as_str).collect()
    };
    // FAIL BEFORE ANY ENGINE STARTS
    for name in &names {
        workload::scenario(name)?;
    }
    if names.is_empty() {
        bail!("no scenarios to evaluate");
    }

    println!("MODE:            BATCH");
    println!("SCENARIOS:       {}", names.join(", "));
    println!("WARMUP:          {} ticks", args.warmup_ticks);
    print_config(&config);
    println!();

    let results = control::batch(
        &config,
        &names,
        args.warmup_ticks,
        Some(args.live_seed),
        |timeline: Arc<Timeline>| -> Box<dyn Launcher> {
            Box::new(IntersectionLauncher::new(timeline, base_schedule()))
        },
        shutdown,
    )?;

    println!("\n{:<12} {:<22} {:<12} {:<10}", "SCENARIO", "LABEL", "CONFIG", "COST");
    println!("{}", "-".repeat(58));
    for r in &results {
        match &r.provenance {
            Some(p) => println!("{:<12} {:<22} {:<12} {:<10.1}",
                r.scenario, p.label.as_str(), p.configuration.to_string(), p.cost),
            None => println!("{:<12} {:<22} {:<12} {:<10}",
                r.scenario, "-", "-", "ABANDONED"),
        }
    }
    Ok(())
}
