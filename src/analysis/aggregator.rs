// src/analysis/aggregator.rs
//
// Turns the four stable lane counts into the scheduling inputs:
// total, per-lane green durations and the priority lane.

use crate::types::{Light, NUM_LANES};
use serde::Serialize;

pub const MIN_SIGNAL_SECS: u32 = 10;
pub const MAX_SIGNAL_SECS: u32 = 60;
/// Budget the per-lane share is scaled against.
pub const CYCLE_SECS: f64 = 60.0;

/// Live intersection state. Guarded by the shared-state lock.
///
/// Invariants: `total_vehicles == lane_counts.iter().sum()`, every
/// `signal_times[i]` is within `[MIN_SIGNAL_SECS, MAX_SIGNAL_SECS]`, and at
/// most one light is green.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficState {
    pub lights: [Light; NUM_LANES],
    pub signal_times: [u32; NUM_LANES],
    pub lane_counts: [u32; NUM_LANES],
    #[serde(rename = "timer")]
    pub current_timer: u32,
    pub total_vehicles: u32,
    pub priority_lane: usize,
}

impl Default for TrafficState {
    fn default() -> Self {
        Self {
            lights: [Light::Red; NUM_LANES],
            signal_times: [MIN_SIGNAL_SECS; NUM_LANES],
            lane_counts: [0; NUM_LANES],
            current_timer: 0,
            total_vehicles: 0,
            priority_lane: 0,
        }
    }
}

impl TrafficState {
    /// Recomputes every derived field from `counts` in one step, so a reader
    /// holding the lock never sees counts without their durations.
    pub fn apply_counts(&mut self, counts: [u32; NUM_LANES]) {
        let aggregate = aggregate(counts);
        self.lane_counts = counts;
        self.total_vehicles = aggregate.total_vehicles;
        self.signal_times = aggregate.signal_times;
        self.priority_lane = aggregate.priority_lane;
    }

    #[cfg(test)]
    pub fn green_lane(&self) -> Option<usize> {
        self.lights.iter().position(|l| *l == Light::Green)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub total_vehicles: u32,
    pub signal_times: [u32; NUM_LANES],
    pub priority_lane: usize,
}

pub fn aggregate(counts: [u32; NUM_LANES]) -> Aggregate {
    let total_vehicles = counts.iter().sum();
    Aggregate {
        total_vehicles,
        signal_times: signal_times(&counts, total_vehicles),
        priority_lane: priority_lane(&counts),
    }
}

/// `clamp(round(count / total * 60), 10, 60)`, or 10 everywhere when the
/// intersection is empty.
pub fn signal_times(counts: &[u32; NUM_LANES], total: u32) -> [u32; NUM_LANES] {
    if total == 0 {
        return [MIN_SIGNAL_SECS; NUM_LANES];
    }
    counts.map(|count| {
        let share = (count as f64 / total as f64 * CYCLE_SECS).round() as u32;
        share.clamp(MIN_SIGNAL_SECS, MAX_SIGNAL_SECS)
    })
}

/// Index of the busiest lane; ties go to the lowest index.
pub fn priority_lane(counts: &[u32; NUM_LANES]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold(0, |best, (i, &c)| if c > counts[best] { i } else { best })
}
