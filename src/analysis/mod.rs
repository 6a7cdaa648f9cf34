// src/analysis/mod.rs
//
// Scheduling logic, independent of video and HTTP.
//
// Signal flow:
//   stable lane counts → aggregator → TrafficState.signal_times ─→ signal_scheduler
//                                   └→ TrafficState.lane_counts ─→ analytics

pub mod aggregator;
pub mod analytics;
pub mod inference_scheduler;
pub mod signal_scheduler;

pub use aggregator::TrafficState;
pub use analytics::{AnalyticsHistory, AnalyticsReport, AnalyticsSnapshot};
pub use inference_scheduler::InferenceScheduler;
pub use signal_scheduler::{SignalChange, SignalScheduler};
