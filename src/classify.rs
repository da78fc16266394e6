// CYBERTWIN WORKLOAD CLASSIFIER
// PURE FUNCTION: LANE COUNTS IN, DISCRETE WORKLOAD LABEL OUT.
//
// PRIORITY: STOPPED VEHICLES (HALTING) ALWAYS DOMINATE MOVING VOLUME (DENSITY).
//   1. SATURATED   BOTH AXES CRITICAL, OR ONE CRITICAL WHILE THE OTHER CARRIES VOLUME
//   2. *-HEAVY     EXACTLY ONE AXIS CRITICAL
//   3. *-FLOW      NO QUEUES BUT HIGH, DIRECTIONAL VOLUME
//   4. HIGH-VOLUME-BALANCED / LIGHT-BALANCED
//
// THE SATURATION RULE MIXES HALTING ON ONE AXIS WITH DENSITY ON THE OTHER.
// THAT ASYMMETRY IS KEPT AS-IS.

use std::fmt;
use std::str::FromStr;

use crate::model::axis_sums;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadLabel {
    Saturated,
    AxisAHeavy,
    AxisBHeavy,
    AxisAFlow,
    AxisBFlow,
    HighVolumeBalanced,
    LightBalanced,
}

impl WorkloadLabel {
    pub const ALL: [WorkloadLabel; 7] = [
        Self::Saturated,
        Self::AxisAHeavy,
        Self::AxisBHeavy,
        Self::AxisAFlow,
        Self::AxisBFlow,
        Self::HighVolumeBalanced,
        Self::LightBalanced,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saturated => "Saturated",
            Self::AxisAHeavy => "AxisA-Heavy",
            Self::AxisBHeavy => "AxisB-Heavy",
            Self::AxisAFlow => "AxisA-Flow",
            Self::AxisBFlow => "AxisB-Flow",
            Self::HighVolumeBalanced => "High-Volume-Balanced",
            Self::LightBalanced => "Light-Balanced",
        }
    }
}

impl fmt::Display for WorkloadLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown workload label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for WorkloadLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

// LABEL PLUS THE NUMBERS IT WAS DERIVED FROM
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub label: WorkloadLabel,
    pub ratio: f64,
    // DENSITY SUMS FOR FLOW / HIGH-VOLUME LABELS, HALTING SUMS OTHERWISE
    pub pressure: (u32, u32),
    pub halting: (u32, u32),
    pub density: (u32, u32),
}

impl Classification {
    pub fn halted_total(&self) -> u32 {
        self.halting.0 + self.halting.1
    }
}

pub fn classify(
    halting: &[u32],
    density: &[u32],
    queue_threshold: u32,
    flow_ratio_threshold: f64,
) -> Classification {
    let (qa, qb) = axis_sums(halting);
    let (ta, tb) = axis_sums(density);

    let a_critical = qa > queue_threshold;
    let b_critical = qb > queue_threshold;

    let make = |label, ratio, pressure| Classification {
        label,
        ratio,
        pressure,
        halting: (qa, qb),
        density: (ta, tb),
    };

    if (a_critical && b_critical)
        || (a_critical && tb > queue_threshold)
        || (b_critical && ta > queue_threshold)
    {
        return make(WorkloadLabel::Saturated, 1.0, (qa, qb));
    }

    if a_critical {
        return make(WorkloadLabel::AxisAHeavy, qa as f64 / qb.max(1) as f64, (qa, qb));
    }
    if b_critical {
        return make(WorkloadLabel::AxisBHeavy, qb as f64 / qa.max(1) as f64, (qa, qb));
    }

    if ta > queue_threshold || tb > queue_threshold {
        let ratio = ta as f64 / tb.max(1) as f64;
        if ratio >= flow_ratio_threshold {
            return make(WorkloadLabel::AxisAFlow, ratio, (ta, tb));
        }
        if ratio <= 1.0 / flow_ratio_threshold {
            // RECIPROCAL, GUARDED THE SAME WAY (ta MAY BE ZERO)
            return make(WorkloadLabel::AxisBFlow, tb as f64 / ta.max(1) as f64, (ta, tb));
        }
        return make(WorkloadLabel::HighVolumeBalanced, 1.0, (ta, tb));
    }

    make(WorkloadLabel::LightBalanced, 1.0, (qa, qb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_str() {
        for l in WorkloadLabel::ALL {
            assert_eq!(l.as_str().parse::<WorkloadLabel>(), Ok(l));
        }
        assert!("NS_Heavy".parse::<WorkloadLabel>().is_err());
    }

    #[test]
    fn b_flow_with_empty_axis_a_is_finite() {
        let c = classify(&[0, 0, 0, 0], &[0, 0, 9, 9], 10, 2.0);
        assert_eq!(c.label, WorkloadLabel::AxisBFlow);
        assert_eq!(c.ratio, 18.0);
        assert_eq!(c.pressure, (0, 18));
    }

    #[test]
    fn priority_rules_in_order() {
        use WorkloadLabel::*;
        // (halting, density, label, ratio, pressure) AT QUEUE 10, FLOW RATIO 2.0
        let table: [([u32; 4], [u32; 4], WorkloadLabel, f64, (u32, u32)); 11] = [
            ([6, 6, 6, 6], [8, 8, 8, 8], Saturated, 1.0, (12, 12)),
            ([11, 0, 0, 0], [11, 0, 6, 5], Saturated, 1.0, (11, 0)),
            ([0, 0, 0, 11], [6, 5, 0, 11], Saturated, 1.0, (0, 11)),
            // OTHER AXIS DENSITY AT THE THRESHOLD IS NOT ENOUGH FOR SATURATED
            ([11, 0, 2, 0], [11, 0, 10, 0], AxisAHeavy, 5.5, (11, 2)),
            ([1, 1, 8, 4], [3, 2, 12, 4], AxisBHeavy, 6.0, (2, 12)),
            // HALTING AT THE THRESHOLD IS NOT CRITICAL
            ([5, 5, 0, 0], [10, 10, 0, 0], AxisAFlow, 20.0, (20, 0)),
            ([0, 0, 0, 0], [10, 10, 3, 2], AxisAFlow, 4.0, (20, 5)),
            ([0, 0, 0, 0], [6, 6, 3, 3], AxisAFlow, 2.0, (12, 6)),
            ([0, 0, 0, 0], [3, 3, 6, 6], AxisBFlow, 2.0, (6, 12)),
            ([0, 0, 0, 0], [6, 6, 5, 5], HighVolumeBalanced, 1.0, (12, 10)),
            ([1, 2, 3, 0], [2, 3, 3, 1], LightBalanced, 1.0, (3, 3)),
        ];
        for (halting, density, label, ratio, pressure) in table {
            let c = classify(&halting, &density, 10, 2.0);
            assert_eq!(c.label, label, "{:?} {:?}", halting, density);
            assert_eq!(c.ratio, ratio, "{:?} {:?}", halting, density);
            assert_eq!(c.pressure, pressure, "{:?} {:?}", halting, density);
        }
    }
}
