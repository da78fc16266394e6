// CYBERTWIN CONFIGURATION APPLIER
// REWRITES ONLY THE CONTROLLED GREEN SLOTS OF THE ENGINE'S CURRENT PROGRAM.
// TRANSITIONAL SLOTS (YELLOW / CLEARANCE) ARE COPIED THROUGH UNTOUCHED AND THE NEW
// PROGRAM IS INSTALLED WITH ONE set_schedule CALL.

use tracing::debug;

use crate::engine::{EngineError, Schedule, SimHandle};
use crate::model::{Bounds, Configuration};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{slots} controlled slots for {genes} gene bounds")]
    ArityMismatch { slots: usize, genes: usize },
    #[error("gene {index} has negative lower bound {lower}: not a duration")]
    NegativeBound { index: usize, lower: i32 },
    #[error("controlled slot {slot} outside a {phases}-phase schedule")]
    SlotOutOfRange { slot: usize, phases: usize },
}

#[derive(Clone, Debug)]
pub struct Applier {
    bounds: Bounds,
    slots: Vec<usize>,
}

impl Applier {
    pub fn new(bounds: Bounds, slots: Vec<usize>) -> Result<Self, ApplyError> {
        if slots.len() != bounds.dims() {
            return Err(ApplyError::ArityMismatch { slots: slots.len(), genes: bounds.dims() });
        }
        if let Some((index, &(lower, _))) = bounds.intervals().iter()
            .enumerate()
            .find(|(_, (lo, _))| *lo < 0)
        {
            return Err(ApplyError::NegativeBound { index, lower });
        }
        Ok(Self { bounds, slots })
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    // PURE REWRITE: CLAMPED GENES INTO THEIR SLOTS, EVERYTHING ELSE CLONED
    pub fn rewrite(&self, current: &Schedule, config: &Configuration) -> Result<Schedule, ApplyError> {
        let phases = current.phases.len();
        if let Some(&slot) = self.slots.iter().find(|&&s| s >= phases) {
            return Err(ApplyError::SlotOutOfRange { slot, phases });
        }

        let clamped = self.bounds.clamp(config);
        let mut next = current.clone();
        for (&slot, &gene) in self.slots.iter().zip(clamped.genes()) {
            // LOWER BOUNDS VALIDATED NON-NEGATIVE IN new()
            next.phases[slot].duration = gene as u32;
        }
        Ok(next)
    }

    pub fn read_back(&self, schedule: &Schedule) -> Configuration {
        let genes = self.slots.iter()
            .filter_map(|&s| schedule.phases.get(s))
            .map(|p| p.duration as i32)
            .collect();
        Configuration::new(genes)
    }

    // RETURNS THE CONFIGURATION ACTUALLY INSTALLED (AFTER CLAMPING)
    pub fn apply(
        &self,
        handle: &mut dyn SimHandle,
        config: &Configuration,
    ) -> Result<Configuration, ApplyError> {
        let current = handle.schedule()?;
        let next = self.rewrite(&current, config)?;
        let installed = self.read_back(&next);
        handle.set_schedule(next)?;
        debug!("APPLY {} (requested {})", installed, config);
        Ok(installed)
    }
}
