// CYBERTWIN v0.3.2 -- SELF-ADAPTIVE SIGNAL-TIMING CONTROLLER
// DETECTS DEMAND SHIFTS AT A SIGNALISED INTERSECTION AND RETUNES THE GREEN SPLIT
//
// DETECTION AND APPLICATION HAPPEN ON THE LIVE ENGINE, ONE TICK AT A TIME
// CANDIDATE EVALUATION HAPPENS ON CHECKPOINTED TWINS, NEVER ON THE LIVE ENGINE

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cybertwin::control::Mode;
use cybertwin::tuning;

use cli::batch::BatchArgs;
use cli::run::RunArgs;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "cybertwin")]
#[command(about = "CYBERTWIN -- SELF-ADAPTIVE SIGNAL-TIMING CONTROLLER")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    // DEBUG-LEVEL LOGGING (RUST_LOG OVERRIDES)
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    // CONTINUOUS MONITORING + ADAPTATION
    Run(RunArgs),
    // DETECTION LOGGING ONLY, NO SEARCH
    Detect(RunArgs),
    // ONE SEARCH PER KNOWN SCENARIO, RESULTS RECORDED TO THE KNOWLEDGE CACHE
    Batch(BatchArgs),
    // PRINT THE KNOWLEDGE CACHE
    Knowledge {
        #[arg(long, default_value = tuning::KNOWLEDGE_FILE)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let opts = Cli::parse();

    let default_level = if opts.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    println!("CYBERTWIN v0.3.2");

    match &opts.command {
        Command::Run(args) => cli::run::run_live(args, Mode::Adapt, &SHUTDOWN)?,
        Command::Detect(args) => cli::run::run_live(args, Mode::DetectOnly, &SHUTDOWN)?,
        Command::Batch(args) => cli::batch::run_batch(args, &SHUTDOWN)?,
        Command::Knowledge { path } => cli::show::run_show(path)?,
    }

    if SHUTDOWN.load(Ordering::Relaxed) {
        println!("INTERRUPTED.");
    }
    println!("CYBERTWIN OUT.");
    Ok(())
}
