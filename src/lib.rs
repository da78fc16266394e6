// CYBERTWIN -- SELF-ADAPTIVE SIGNAL-TIMING CONTROLLER
// DETECTS WORKLOAD SHIFTS ON A LIVE INTERSECTION, SEARCHES FOR A BETTER GREEN SPLIT
// ON CHECKPOINTED TWINS, REMEMBERS WHAT WORKED PER WORKLOAD.

pub mod tuning;
pub mod model;
pub mod engine;
pub mod collector;
pub mod classify;
pub mod gate;
pub mod checkpoint;
pub mod apply;
pub mod twin;
pub mod evolve;
pub mod knowledge;
pub mod workload;
pub mod sim;
pub mod event;
pub mod control;
