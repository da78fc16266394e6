// CYBERTWIN EVENT LOG
// RECORDS ONE SNAPSHOT PER CONTROL TICK PLUS EVERY ADAPTATION EPISODE.
// TICK SNAPSHOTS LIVE IN A FIXED-CAPACITY RING BUFFER, OLDEST OVERWRITTEN.
// EPISODES ARE FEW AND KEPT IN FULL: THEY ARE THE PROVENANCE OF EVERY CONFIG CHANGE.

use std::collections::BTreeMap;
use std::fmt;

use crate::classify::WorkloadLabel;
use crate::model::Configuration;

const MAX_SNAPSHOTS: usize = 8192;

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub halting: (u32, u32),
    pub density: (u32, u32),
    pub detected: WorkloadLabel,
    pub actual: Option<String>,
    pub config: Configuration,
}

// WHERE AN APPLIED CONFIGURATION CAME FROM
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Cache,
    Search,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Cache => "CACHE",
            Source::Search => "SEARCH",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Provenance {
    pub tick: u64,
    pub label: WorkloadLabel,
    pub configuration: Configuration,
    pub cost: f64,
    pub source: Source,
    pub evaluations: u64,
}

pub struct EventLog {
    snapshots: Vec<Snapshot>,
    head: usize,
    episodes: Vec<Provenance>,
    abandoned: u32,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

// SCENARIO NAME -> LABELS THAT COUNT AS A CORRECT DETECTION
fn agrees(actual: &str, detected: WorkloadLabel) -> Option<bool> {
    use WorkloadLabel::*;
    let expected: &[WorkloadLabel] = match actual {
        "NS_Heavy" => &[AxisAHeavy, AxisAFlow],
        "EW_Heavy" => &[AxisBHeavy, AxisBFlow],
        "Balanced" => &[HighVolumeBalanced, LightBalanced],
        _ => return None,
    };
    Some(expected.contains(&detected))
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::with_capacity(MAX_SNAPSHOTS),
            head: 0,
            episodes: Vec::new(),
            abandoned: 0,
        }
    }

    // OVERWRITES OLDEST ENTRY WHEN FULL
    pub fn snapshot(&mut self, snap: Snapshot) {
        if self.snapshots.len() < MAX_SNAPSHOTS {
            self.snapshots.push(snap);
        } else {
            self.snapshots[self.head] = snap;
        }
        self.head = (self.head + 1) % MAX_SNAPSHOTS;
    }

    pub fn episode(&mut self, provenance: Provenance) {
        self.episodes.push(provenance);
    }

    pub fn abandon(&mut self) {
        self.abandoned += 1;
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn episodes(&self) -> &[Provenance] {
        &self.episodes
    }

    pub fn abandoned(&self) -> u32 {
        self.abandoned
    }

    pub fn cache_hits(&self) -> usize {
        self.episodes.iter().filter(|e| e.source == Source::Cache).count()
    }

    // ITERATE SNAPSHOTS IN CHRONOLOGICAL ORDER
    pub fn iter_chronological(&self) -> impl Iterator<Item = &Snapshot> {
        let len = self.snapshots.len();
        let start = if len < MAX_SNAPSHOTS { 0 } else { self.head };
        (0..len).map(move |i| &self.snapshots[(start + i) % MAX_SNAPSHOTS])
    }

    // (AGREEING, COMPARABLE) TICKS: GROUND TRUTH KNOWN AND NOT "Unknown"
    pub fn agreement(&self) -> (usize, usize) {
        self.iter_chronological()
            .filter_map(|s| s.actual.as_deref().and_then(|a| agrees(a, s.detected)))
            .fold((0, 0), |(hit, n), ok| (hit + ok as usize, n + 1))
    }

    pub fn label_distribution(&self) -> BTreeMap<WorkloadLabel, usize> {
        let mut dist = BTreeMap::new();
        for s in self.iter_chronological() {
            *dist.entry(s.detected).or_insert(0) += 1;
        }
        dist
    }

    // DUMP THE TIME SERIES AFTER EXECUTION
    pub fn dump(&self) {
        if self.snapshots.is_empty() {
            return;
        }

        println!("\n{:<8} {:<10} {:<10} {:<22} {:<10} {:<10}",
            "TICK", "HALT A/B", "DENS A/B", "DETECTED", "ACTUAL", "CONFIG");
        println!("{}", "-".repeat(76));

        for s in self.iter_chronological() {
            println!("{:<8} {:<10} {:<10} {:<22} {:<10} {:<10}",
                s.tick,
                format!("{}/{}", s.halting.0, s.halting.1),
                format!("{}/{}", s.density.0, s.density.1),
                s.detected.as_str(),
                s.actual.as_deref().unwrap_or("-"),
                s.config.to_string());
        }

        if self.snapshots.len() == MAX_SNAPSHOTS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} SNAPSHOTS)", MAX_SNAPSHOTS);
        }
        println!("TOTAL SNAPSHOTS: {}", self.snapshots.len());
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        println!("\n{}", "=".repeat(50));
        println!("CYBERTWIN SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  TICKS:             {}", self.snapshots.len());

        let total = self.snapshots.len().max(1) as f64;
        for (label, n) in self.label_distribution() {
            println!("  {:<20} {:>6} ({:.1}%)", label.as_str(), n, n as f64 / total * 100.0);
        }

        let (hit, n) = self.agreement();
        if n > 0 {
            println!("  DETECTION MATCH:   {}/{} ({:.1}%)", hit, n, hit as f64 / n as f64 * 100.0);
        }

        let evaluations: u64 = self.episodes.iter().map(|e| e.evaluations).sum();
        println!("  EPISODES:          {} (cache hits {}, abandoned {})",
            self.episodes.len(), self.cache_hits(), self.abandoned);
        println!("  TWIN EVALUATIONS:  {}", evaluations);
        for e in &self.episodes {
            println!("    t={:<6} {:<20} {} cost={:.1} [{}]",
                e.tick, e.label.as_str(), e.configuration, e.cost, e.source);
        }
        if let Some(last) = self.iter_chronological().last() {
            println!("  FINAL CONFIG:      {}", last.config);
        }
    }
}
