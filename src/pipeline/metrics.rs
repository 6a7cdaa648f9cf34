// src/pipeline/metrics.rs
//
// Pipeline counters. Lock-free so the stream fanout and processing loop
// never contend on the shared-state mutex just to count. Exported via
// GET /metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_ticks: Arc<AtomicU64>,
    pub detector_runs: Arc<AtomicU64>,
    pub detector_failures: Arc<AtomicU64>,
    pub source_failures: Arc<AtomicU64>,
    pub frames_published: Arc<AtomicU64>,
    pub encode_failures: Arc<AtomicU64>,
    pub active_streams: Arc<AtomicU64>,
    pub tick_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_ticks: Arc::new(AtomicU64::new(0)),
            detector_runs: Arc::new(AtomicU64::new(0)),
            detector_failures: Arc::new(AtomicU64::new(0)),
            source_failures: Arc::new(AtomicU64::new(0)),
            frames_published: Arc::new(AtomicU64::new(0)),
            encode_failures: Arc::new(AtomicU64::new(0)),
            active_streams: Arc::new(AtomicU64::new(0)),
            tick_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self, counter: &AtomicU64) {
        // Saturating so a double release cannot wrap the gauge.
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    /// Processing ticks per second since startup.
    pub fn fps(&self) -> f64 {
        let ticks = self.total_ticks.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            ticks as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_ticks: self.total_ticks.load(Ordering::Relaxed),
            fps: self.fps(),
            detector_runs: self.detector_runs.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            last_tick_us: self.tick_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub fps: f64,
    pub detector_runs: u64,
    pub detector_failures: u64,
    pub source_failures: u64,
    pub frames_published: u64,
    pub encode_failures: u64,
    pub active_streams: u64,
    pub last_tick_us: u64,
    pub elapsed_secs: f64,
}

/// Decrements the active stream gauge when a stream is dropped.
pub struct StreamGuard {
    metrics: PipelineMetrics,
}

impl StreamGuard {
    pub fn new(metrics: PipelineMetrics) -> Self {
        metrics.inc(&metrics.active_streams);
        Self { metrics }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.metrics.dec(&self.metrics.active_streams);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_summary() {
        let metrics = PipelineMetrics::new();
        metrics.inc(&metrics.total_ticks);
        metrics.add(&metrics.frames_published, 4);
        metrics.inc(&metrics.detector_failures);

        let summary = metrics.summary();
        assert_eq!(summary.total_ticks, 1);
        assert_eq!(summary.frames_published, 4);
        assert_eq!(summary.detector_failures, 1);
    }

    #[test]
    fn test_stream_guard_tracks_active_streams() {
        let metrics = PipelineMetrics::new();
        {
            let _a = StreamGuard::new(metrics.clone());
            let _b = StreamGuard::new(metrics.clone());
            assert_eq!(metrics.summary().active_streams, 2);
        }
        assert_eq!(metrics.summary().active_streams, 0);
        metrics.dec(&metrics.active_streams);
        assert_eq!(metrics.summary().active_streams, 0);
    }
}
