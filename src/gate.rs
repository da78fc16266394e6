// CYBERTWIN HYSTERESIS GATE
// DEBOUNCES THE CLASSIFIER. A SEARCH EPISODE IS EXPENSIVE: ONE NOISY TICK MUST NOT START ONE.
//
//   LOW-TRAFFIC SUPPRESSION: FEWER THAN min_halted STOPPED VEHICLES -> KEEP CURRENT LABEL
//   CANDIDATE HOLD:          SAME LABEL MUST REPEAT min_stable TICKS IN A ROW
//   CHECK CADENCE:           ONLY EVALUATED ON TICKS DIVISIBLE BY check_every

use crate::classify::{Classification, WorkloadLabel};

pub struct HysteresisGate {
    check_every: u64,
    min_stable: u32,
    min_halted: u32,
    current: Option<WorkloadLabel>,
    candidate: Option<WorkloadLabel>,
    stable: u32,
    last_change_tick: Option<u64>,
}

impl HysteresisGate {
    pub fn new(check_every: u64, min_stable: u32, min_halted: u32) -> Self {
        Self {
            check_every: check_every.max(1),
            min_stable,
            min_halted,
            current: None,
            candidate: None,
            stable: 0,
            last_change_tick: None,
        }
    }

    pub fn current(&self) -> Option<WorkloadLabel> {
        self.current
    }

    pub fn candidate(&self) -> Option<WorkloadLabel> {
        self.candidate
    }

    pub fn stable_count(&self) -> u32 {
        self.stable
    }

    pub fn last_change_tick(&self) -> Option<u64> {
        self.last_change_tick
    }

    // CANDIDATE DIFFERS FROM THE ACTIVE LABEL
    pub fn change_pending(&self) -> bool {
        self.candidate.is_some() && self.candidate != self.current
    }

    // LABEL AFTER LOW-TRAFFIC SUPPRESSION
    pub fn effective_label(&self, c: &Classification) -> WorkloadLabel {
        match self.current {
            Some(current) if c.halted_total() < self.min_halted => current,
            _ => c.label,
        }
    }

    // RETURNS THE NEW LABEL WHEN A RECONFIGURATION IS WARRANTED
    pub fn observe(&mut self, c: &Classification, tick: u64) -> Option<WorkloadLabel> {
        let label = self.effective_label(c);

        if self.candidate != Some(label) {
            self.candidate = Some(label);
            self.stable = 1;
        } else {
            self.stable = self.stable.saturating_add(1);
        }

        if tick % self.check_every == 0
            && self.stable >= self.min_stable
            && self.candidate != self.current
        {
            self.current = self.candidate;
            self.last_change_tick = Some(tick);
            return self.current;
        }
        None
    }

    // ROLL BACK A TRIGGER WHOSE EPISODE WAS ABANDONED. THE CANDIDATE STAYS, SO THE
    // NEXT CHECK TICK RETRIES.
    pub fn revert(&mut self, previous: Option<WorkloadLabel>) {
        self.current = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    fn light() -> Classification {
        classify(&[0, 0, 0, 0], &[1, 1, 1, 1], 10, 2.0)
    }

    #[test]
    fn first_label_needs_stable_run_and_check_tick() {
        let mut g = HysteresisGate::new(5, 3, 0);
        let c = light();
        assert_eq!(g.observe(&c, 1), None);
        assert_eq!(g.observe(&c, 2), None);
        assert_eq!(g.observe(&c, 3), None); // STABLE BUT NOT A CHECK TICK
        assert_eq!(g.observe(&c, 4), None);
        assert_eq!(g.observe(&c, 5), Some(WorkloadLabel::LightBalanced));
        assert_eq!(g.last_change_tick(), Some(5));
        assert!(!g.change_pending());
    }

    #[test]
    fn no_retrigger_for_same_label() {
        let mut g = HysteresisGate::new(1, 1, 0);
        let c = light();
        assert!(g.observe(&c, 0).is_some());
        for t in 1..20 {
            assert_eq!(g.observe(&c, t), None);
        }
    }
}
