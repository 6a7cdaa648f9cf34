// src/pipeline/shared_state.rs
//
// The one mutable structure shared by every loop and HTTP handler.
// A single mutex guards traffic state, analytics history and the
// per-lane latest-frame cache. Critical sections are short copies;
// detection and JPEG encoding always happen outside the lock.

use crate::analysis::{AnalyticsHistory, AnalyticsReport, AnalyticsSnapshot, TrafficState};
use crate::types::{Frame, LaneSample, NUM_LANES};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SharedInner {
    pub traffic: TrafficState,
    pub history: AnalyticsHistory,
    /// Last-value-wins slot per lane.
    pub frames: [Option<Arc<Frame>>; NUM_LANES],
}

pub struct SharedState {
    inner: Mutex<SharedInner>,
}

pub type SharedHandle = Arc<SharedState>;

impl SharedState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SharedInner {
                traffic: TrafficState::default(),
                history: AnalyticsHistory::with_capacity(history_capacity),
                frames: Default::default(),
            }),
        }
    }

    pub fn handle(history_capacity: usize) -> SharedHandle {
        Arc::new(Self::new(history_capacity))
    }

    /// Every critical section writes complete values, so a guard
    /// recovered from a panicked holder is still consistent.
    pub fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes one processing tick: counts, derived scheduling inputs and
    /// fresh frames, all in one critical section. Lanes without a frame
    /// this tick keep their previous cache entry. Returns the number of
    /// frames replaced.
    pub fn publish_tick(&self, samples: Vec<LaneSample>) -> usize {
        let mut counts = [0u32; NUM_LANES];
        let mut fresh: [Option<Arc<Frame>>; NUM_LANES] = Default::default();

        for sample in samples {
            if sample.lane_id >= NUM_LANES {
                continue;
            }
            counts[sample.lane_id] = sample.stable_count();
            fresh[sample.lane_id] = sample.frame.map(Arc::new);
        }

        let mut inner = self.lock();
        inner.traffic.apply_counts(counts);

        let mut replaced = 0;
        for (slot, frame) in inner.frames.iter_mut().zip(fresh) {
            if let Some(frame) = frame {
                *slot = Some(frame);
                replaced += 1;
            }
        }
        replaced
    }

    pub fn traffic_snapshot(&self) -> TrafficState {
        self.lock().traffic.clone()
    }

    pub fn latest_frame(&self, lane: usize) -> Option<Arc<Frame>> {
        self.lock().frames.get(lane).cloned().flatten()
    }

    /// Appends one analytics snapshot of the current counts.
    pub fn record_snapshot(&self, timestamp: i64) -> AnalyticsSnapshot {
        let mut inner = self.lock();
        let snapshot = AnalyticsSnapshot::new(timestamp, inner.traffic.lane_counts);
        inner.history.push(snapshot);
        snapshot
    }

    pub fn analytics_report(&self, now: i64) -> AnalyticsReport {
        self.lock().history.report(now)
    }
}
