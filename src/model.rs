// CYBERTWIN DATA MODEL
// CONFIGURATIONS, GENE BOUNDS, STATE VECTORS, EVALUATED CANDIDATES

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tuning::GREEN_BOUNDS;

// --- CONFIGURATION ---

// ONE INTEGER PER CONTROLLED SLOT (GREEN SECONDS). SERIALIZED AS A PLAIN ARRAY.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Vec<i32>);

impl Configuration {
    pub fn new(genes: Vec<i32>) -> Self {
        Self(genes)
    }

    pub fn genes(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i32>> for Configuration {
    fn from(genes: Vec<i32>) -> Self {
        Self(genes)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, g) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", g)?;
        }
        write!(f, "]")
    }
}

// --- BOUNDS ---

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BoundsError {
    #[error("no gene bounds given")]
    Empty,
    #[error("invalid bound for gene {index}: lower={lower} > upper={upper}")]
    Inverted { index: usize, lower: i32, upper: i32 },
}

// CLOSED INTERVAL PER GENE
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds(Vec<(i32, i32)>);

impl Bounds {
    pub fn new(intervals: Vec<(i32, i32)>) -> Result<Self, BoundsError> {
        if intervals.is_empty() {
            return Err(BoundsError::Empty);
        }
        for (index, &(lower, upper)) in intervals.iter().enumerate() {
            if lower > upper {
                return Err(BoundsError::Inverted { index, lower, upper });
            }
        }
        Ok(Self(intervals))
    }

    pub fn green_default() -> Self {
        Self(GREEN_BOUNDS.to_vec())
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn intervals(&self) -> &[(i32, i32)] {
        &self.0
    }

    pub fn clamp_gene(&self, index: usize, value: i32) -> i32 {
        match self.0.get(index) {
            Some(&(lo, hi)) => value.clamp(lo, hi),
            None => value,
        }
    }

    // OUT-OF-RANGE GENES ARE PULLED TO THE NEAREST EDGE. MISSING GENES TAKE THE LOWER
    // BOUND, SURPLUS GENES ARE DROPPED: THE RESULT ALWAYS HAS dims() GENES.
    pub fn clamp(&self, config: &Configuration) -> Configuration {
        let genes = self.0.iter()
            .enumerate()
            .map(|(i, &(lo, hi))| config.genes().get(i).copied().unwrap_or(lo).clamp(lo, hi))
            .collect();
        Configuration(genes)
    }

    pub fn contains(&self, config: &Configuration) -> bool {
        config.len() == self.dims()
            && config.genes().iter()
                .zip(self.0.iter())
                .all(|(&g, &(lo, hi))| g >= lo && g <= hi)
    }
}

// --- STATE VECTOR ---

// ONE SCALAR PER MONITORED LANE. FIRST HALF OF THE LANES IS AXIS A, SECOND HALF AXIS B.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector {
    pub halting: Vec<u32>,
    pub density: Vec<u32>,
}

impl StateVector {
    pub fn new(halting: Vec<u32>, density: Vec<u32>) -> Self {
        Self { halting, density }
    }

    pub fn halting_by_axis(&self) -> (u32, u32) {
        axis_sums(&self.halting)
    }

    pub fn density_by_axis(&self) -> (u32, u32) {
        axis_sums(&self.density)
    }
}

pub fn axis_sums(lanes: &[u32]) -> (u32, u32) {
    let split = lanes.len() / 2;
    let a = lanes[..split].iter().sum();
    let b = lanes[split..].iter().sum();
    (a, b)
}

// --- CANDIDATE ---

// COSTS ARE ONLY COMPARABLE WITHIN ONE CHECKPOINT SET
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub configuration: Configuration,
    pub cost: f64,
}

impl Candidate {
    pub fn new(configuration: Configuration, cost: f64) -> Self {
        Self { configuration, cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_reject_inverted_interval() {
        let err = Bounds::new(vec![(15, 60), (70, 20)]).unwrap_err();
        assert_eq!(err, BoundsError::Inverted { index: 1, lower: 70, upper: 20 });
        assert_eq!(Bounds::new(vec![]).unwrap_err(), BoundsError::Empty);
    }

    #[test]
    fn clamp_pulls_genes_to_edges() {
        let b = Bounds::green_default();
        let c = b.clamp(&Configuration::new(vec![3, 99]));
        assert_eq!(c.genes(), &[15, 60]);
        assert!(b.contains(&c));
    }

    #[test]
    fn clamp_normalizes_length() {
        let b = Bounds::green_default();
        assert_eq!(b.clamp(&Configuration::new(vec![40])).genes(), &[40, 15]);
        assert_eq!(b.clamp(&Configuration::new(vec![40, 41, 42])).genes(), &[40, 41]);
    }

    #[test]
    fn axis_sums_split_lanes_in_half() {
        let s = StateVector::new(vec![12, 1, 0, 0], vec![20, 5, 2, 1]);
        assert_eq!(s.halting_by_axis(), (13, 0));
        assert_eq!(s.density_by_axis(), (25, 3));
    }

    #[test]
    fn configuration_serializes_as_array() {
        let c = Configuration::new(vec![30, 45]);
        assert_eq!(serde_json::to_string(&c).unwrap(), "[30,45]");
        assert_eq!(c.to_string(), "[30, 45]");
    }
}
