// CYBERTWIN METRIC COLLECTOR
// READ-ONLY VIEW OF THE ENGINE, SAMPLED ONCE PER TICK.
//
// WAIT METER: PER-ENTITY HISTORY OF CUMULATIVE WAITING TIME. EACH SAMPLE YIELDS THE
// WAITING ADDED SINCE THE PREVIOUS SAMPLE. THE CALLER MUST reset() AT THE START OF
// EVERY MEASUREMENT WINDOW AND AFTER EVERY SNAPSHOT RESTORE: ENTITY IDS ARE NOT
// STABLE ACROSS REPLICATIONS.

use std::collections::HashMap;

use crate::engine::{EngineError, EntityId, SimHandle};
use crate::model::StateVector;

pub fn collect(handle: &mut dyn SimHandle) -> Result<StateVector, EngineError> {
    handle.state()
}

#[derive(Default)]
pub struct WaitMeter {
    prev: HashMap<EntityId, f64>,
}

impl WaitMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.prev.clear();
    }

    pub fn tracked(&self) -> usize {
        self.prev.len()
    }

    pub fn sample(&mut self, handle: &mut dyn SimHandle) -> Result<f64, EngineError> {
        let waits = handle.accumulated_waits()?;
        Ok(self.observe(&waits))
    }

    // SUM OF POSITIVE DELTAS. FIRST SIGHTING OF AN ENTITY CONTRIBUTES ZERO.
    // ENTITIES NO LONGER PRESENT ARE EVICTED.
    pub fn observe(&mut self, waits: &HashMap<EntityId, f64>) -> f64 {
        let mut total = 0.0;
        for (&id, &cur) in waits {
            let prev = self.prev.insert(id, cur).unwrap_or(cur);
            let delta = cur - prev;
            if delta > 0.0 {
                total += delta;
            }
        }
        self.prev.retain(|id, _| waits.contains_key(id));
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waits(entries: &[(EntityId, f64)]) -> HashMap<EntityId, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn first_sighting_contributes_zero() {
        let mut m = WaitMeter::new();
        assert_eq!(m.observe(&waits(&[(1, 12.0), (2, 3.0)])), 0.0);
        assert_eq!(m.tracked(), 2);
    }

    #[test]
    fn sums_positive_deltas() {
        let mut m = WaitMeter::new();
        m.observe(&waits(&[(1, 10.0), (2, 4.0)]));
        assert_eq!(m.observe(&waits(&[(1, 11.0), (2, 6.0)])), 3.0);
    }

    #[test]
    fn negative_delta_is_ignored() {
        // ENGINE MAY DECAY ACCUMULATED WAIT (MEMORY WINDOW)
        let mut m = WaitMeter::new();
        m.observe(&waits(&[(1, 10.0)]));
        assert_eq!(m.observe(&waits(&[(1, 8.0)])), 0.0);
        assert_eq!(m.observe(&waits(&[(1, 9.0)])), 1.0);
    }

    #[test]
    fn departed_entities_are_evicted() {
        let mut m = WaitMeter::new();
        m.observe(&waits(&[(1, 10.0), (2, 4.0)]));
        m.observe(&waits(&[(2, 5.0)]));
        assert_eq!(m.tracked(), 1);

        // ID REUSED AFTER EVICTION COUNTS AS A FIRST SIGHTING
        assert_eq!(m.observe(&waits(&[(1, 50.0), (2, 5.0)])), 0.0);
    }

    #[test]
    fn reset_forgets_history() {
        let mut m = WaitMeter::new();
        m.observe(&waits(&[(1, 10.0)]));
        m.reset();
        assert_eq!(m.tracked(), 0);
        assert_eq!(m.observe(&waits(&[(1, 30.0)])), 0.0);
    }
}
