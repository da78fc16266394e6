// CYBERTWIN WORKLOAD TIMELINES
// DEMAND OVER TIME AS CONSECUTIVE SEGMENTS OF NAMED SCENARIOS.
// A SCENARIO IS A PER-LANE ARRIVAL PROBABILITY PER TICK FOR EACH AXIS.
//
// UNKNOWN SCENARIO NAMES ARE FATAL AT SETUP: NEVER RUN ON THE WRONG DEMAND.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scenario {
    pub name: &'static str,
    pub prob_a: f64,
    pub prob_b: f64,
}

pub const SCENARIOS: [Scenario; 3] = [
    Scenario { name: "NS_Heavy", prob_a: 0.5, prob_b: 0.05 },
    Scenario { name: "EW_Heavy", prob_a: 0.05, prob_b: 0.5 },
    Scenario { name: "Balanced", prob_a: 0.2, prob_b: 0.2 },
];

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("unknown scenario name: {0}")]
    UnknownScenario(String),
    #[error("segment length must be positive")]
    ZeroSegment,
    #[error("timeline end overflows at segment {0}")]
    Overflow(usize),
}

pub fn scenario(name: &str) -> Result<Scenario, WorkloadError> {
    SCENARIOS.iter()
        .copied()
        .find(|s| s.name == name)
        .ok_or_else(|| WorkloadError::UnknownScenario(name.to_string()))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub begin: u64,
    pub end: u64,
    pub prob_a: f64,
    pub prob_b: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    // BACK-TO-BACK SEGMENTS OF EQUAL LENGTH STARTING AT t0
    pub fn from_names<S: AsRef<str>>(names: &[S], segment_len: u64, t0: u64) -> Result<Self, WorkloadError> {
        if segment_len == 0 {
            return Err(WorkloadError::ZeroSegment);
        }
        let mut segments = Vec::with_capacity(names.len());
        let mut t = t0;
        for (index, name) in names.iter().enumerate() {
            let s = scenario(name.as_ref())?;
            let end = t.checked_add(segment_len).ok_or(WorkloadError::Overflow(index))?;
            segments.push(Segment {
                name: s.name.to_string(),
                begin: t,
                end,
                prob_a: s.prob_a,
                prob_b: s.prob_b,
            });
            t = end;
        }
        Ok(Self { segments })
    }

    // ONE OPEN-ENDED SEGMENT
    pub fn constant(name: &str) -> Result<Self, WorkloadError> {
        let s = scenario(name)?;
        Ok(Self {
            segments: vec![Segment {
                name: s.name.to_string(),
                begin: 0,
                end: u64::MAX,
                prob_a: s.prob_a,
                prob_b: s.prob_b,
            }],
        })
    }

    // EVERY CYCLE VISITS EACH SCENARIO ONCE IN SHUFFLED ORDER.
    // AN ORDER IDENTICAL TO THE PREVIOUS CYCLE IS REVERSED.
    pub fn random_cycling(segment_len: u64, n_cycles: u32, seed: u64) -> Result<Self, WorkloadError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut names: Vec<&str> = Vec::with_capacity(SCENARIOS.len() * n_cycles as usize);
        let mut last: Option<Vec<&str>> = None;

        for _ in 0..n_cycles {
            let mut order: Vec<&str> = SCENARIOS.iter().map(|s| s.name).collect();
            order.shuffle(&mut rng);
            if order.len() > 1 && last.as_ref() == Some(&order) {
                order.reverse();
            }
            names.extend_from_slice(&order);
            last = Some(order);
        }

        Self::from_names(&names, segment_len, 0)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn end(&self) -> u64 {
        self.segments.last().map(|s| s.end).unwrap_or(0)
    }

    fn segment_at(&self, t: u64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.begin <= t && t < s.end)
    }

    // GROUND TRUTH FOR MONITOR LOGS
    pub fn actual_label(&self, t: u64) -> &str {
        self.segment_at(t).map(|s| s.name.as_str()).unwrap_or(UNKNOWN_LABEL)
    }

    // NO DEMAND OUTSIDE THE TIMELINE
    pub fn arrival_probs(&self, t: u64) -> (f64, f64) {
        self.segment_at(t).map(|s| (s.prob_a, s.prob_b)).unwrap_or((0.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scenario_is_fatal() {
        assert_eq!(
            Timeline::from_names(&["Balanced", "Rush"], 100, 0).unwrap_err(),
            WorkloadError::UnknownScenario("Rush".into())
        );
        assert!(Timeline::constant("nope").is_err());
    }

    #[test]
    fn segments_are_contiguous() {
        let t = Timeline::from_names(&["NS_Heavy", "Balanced"], 200, 10).unwrap();
        assert_eq!(t.end(), 410);
        assert_eq!(t.actual_label(10), "NS_Heavy");
        assert_eq!(t.actual_label(209), "NS_Heavy");
        assert_eq!(t.actual_label(210), "Balanced");
        assert_eq!(t.actual_label(410), UNKNOWN_LABEL);
        assert_eq!(t.arrival_probs(5), (0.0, 0.0));
    }

    #[test]
    fn random_cycling_visits_every_scenario_per_cycle() {
        let t = Timeline::random_cycling(200, 3, 42).unwrap();
        assert_eq!(t.segments().len(), 9);
        assert_eq!(t.end(), 1800);
        for cycle in t.segments().chunks(3) {
            let mut names: Vec<&str> = cycle.iter().map(|s| s.name.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["Balanced", "EW_Heavy", "NS_Heavy"]);
        }
        // CONSECUTIVE CYCLES NEVER REPEAT THE SAME ORDER
        let orders: Vec<Vec<&str>> = t.segments().chunks(3)
            .map(|c| c.iter().map(|s| s.name.as_str()).collect())
            .collect();
        for w in orders.windows(2) {
            assert_ne!(w[0], w[1]);
        }
    }

    #[test]
    fn overflowing_timeline_is_an_error() {
        let half = u64::MAX / 2 + 1;
        assert_eq!(
            Timeline::from_names(&["Balanced", "NS_Heavy"], half, 0).unwrap_err(),
            WorkloadError::Overflow(1)
        );
        assert_eq!(
            Timeline::from_names(&["Balanced"], 10, u64::MAX - 5).unwrap_err(),
            WorkloadError::Overflow(0)
        );
        let t = Timeline::from_names(&["Balanced"], 10, u64::MAX - 10).unwrap();
        assert_eq!(t.end(), u64::MAX);
        assert!(Timeline::random_cycling(u64::MAX / 2, 1, 3).is_err());
    }

    #[test]
    fn random_cycling_is_seeded() {
        assert_eq!(
            Timeline::random_cycling(50, 4, 9).unwrap(),
            Timeline::random_cycling(50, 4, 9).unwrap()
        );
    }
}
