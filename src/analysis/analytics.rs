// src/analysis/analytics.rs
//
// Bounded time series of intersection load. One snapshot per analytics
// tick; once full, every push evicts exactly the oldest entry.

use crate::types::NUM_LANES;
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 180; // 3 min at 1 Hz

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalyticsSnapshot {
    /// Unix seconds
    pub timestamp: i64,
    pub total: u32,
    pub per_lane: [u32; NUM_LANES],
}

impl AnalyticsSnapshot {
    pub fn new(timestamp: i64, per_lane: [u32; NUM_LANES]) -> Self {
        Self {
            timestamp,
            total: per_lane.iter().sum(),
            per_lane,
        }
    }
}

pub struct AnalyticsHistory {
    entries: VecDeque<AnalyticsSnapshot>,
    capacity: usize,
}

impl AnalyticsHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: AnalyticsSnapshot) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&AnalyticsSnapshot> {
        self.entries.back()
    }

    #[cfg(test)]
    fn oldest(&self) -> Option<&AnalyticsSnapshot> {
        self.entries.front()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Series ordered oldest to newest, ages relative to `now`.
    pub fn report(&self, now: i64) -> AnalyticsReport {
        let mut report = AnalyticsReport::empty();

        for snap in &self.entries {
            report.times.push((now - snap.timestamp).max(0));
            report.total.push(snap.total);
            for (lane, series) in report.lanes.iter_mut().enumerate() {
                series.push(snap.per_lane[lane]);
            }
        }

        if !report.total.is_empty() {
            let sum: u64 = report.total.iter().map(|&t| t as u64).sum();
            report.avg_total = (sum as f64 / report.total.len() as f64).round() as u32;
        }

        if let Some(latest) = self.latest() {
            let peak_lane = crate::analysis::aggregator::priority_lane(&latest.per_lane);
            report.peak_lane = peak_lane;
            report.peak_total = latest.per_lane[peak_lane];
        }

        report
    }
}

impl Default for AnalyticsHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `GET /analytics_data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    /// Seconds ago, per snapshot
    pub times: Vec<i64>,
    pub total: Vec<u32>,
    pub lanes: Vec<Vec<u32>>,
    pub avg_total: u32,
    pub peak_lane: usize,
    pub peak_total: u32,
}

impl AnalyticsReport {
    pub fn empty() -> Self {
        Self {
            times: Vec::new(),
            total: Vec::new(),
            lanes: vec![Vec::new(); NUM_LANES],
            avg_total: 0,
            peak_lane: 0,
            peak_total: 0,
        }
    }
}
