// src/pipeline/frame_publisher.rs
//
// Producer side of the frame fanout. One OS thread runs every lane's
// processor once per tick, then publishes counts and frames into shared
// state in a single critical section. Blocking decode and detection
// happen before the lock is taken.

use super::metrics::PipelineMetrics;
use super::shared_state::SharedHandle;
use super::shutdown::Shutdown;
use crate::error::DetectorError;
use crate::lane_processor::LaneProcessor;
use crate::types::{Frame, LaneSample};
use crate::vehicle_detection::{DetectParams, Detection, Detector};
use anyhow::{Context, Result};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

const STATS_EVERY_TICKS: u64 = 300;

pub struct FramePublisher {
    lanes: Vec<LaneProcessor>,
    detector: Box<dyn Detector>,
    shared: SharedHandle,
    metrics: PipelineMetrics,
    tick_interval: Duration,
    ticks: u64,
}

impl FramePublisher {
    pub fn new(
        lanes: Vec<LaneProcessor>,
        detector: Box<dyn Detector>,
        shared: SharedHandle,
        metrics: PipelineMetrics,
        tick_interval: Duration,
    ) -> Self {
        Self {
            lanes,
            detector,
            shared,
            metrics,
            tick_interval,
            ticks: 0,
        }
    }

    /// Runs every lane once and publishes the results.
    pub fn tick(&mut self) {
        let started = Instant::now();

        let detector = self.detector.as_mut();
        let mut samples: Vec<LaneSample> = Vec::with_capacity(self.lanes.len());
        let mut detector_runs = 0;
        for lane in self.lanes.iter_mut() {
            let runs_before = lane.scheduler().get_stats().invocations;
            let sample = lane.process(detector);
            detector_runs += lane.scheduler().get_stats().invocations - runs_before;

            if lane.is_enabled() && sample.frame.is_none() {
                self.metrics.inc(&self.metrics.source_failures);
            }
            trace!(
                "Lane {} frame {}: raw={} smoothed={:.2} boxes={:?}",
                sample.lane_id,
                sample.frame_index,
                sample.raw_count,
                sample.smoothed_count,
                sample
                    .bounding_boxes
                    .iter()
                    .map(|d| d.class_name.as_str())
                    .collect::<Vec<_>>()
            );
            samples.push(sample);
        }

        let replaced = self.shared.publish_tick(samples);

        self.ticks += 1;
        self.metrics.inc(&self.metrics.total_ticks);
        self.metrics.add(&self.metrics.detector_runs, detector_runs);
        self.metrics.add(&self.metrics.frames_published, replaced as u64);
        self.metrics
            .set_timing(&self.metrics.tick_time_us, started.elapsed().as_micros() as u64);

        if self.ticks % STATS_EVERY_TICKS == 0 {
            let counts: Vec<u32> = self.lanes.iter().map(|l| l.stable_count()).collect();
            let detections: Vec<String> = self
                .lanes
                .iter()
                .map(|l| {
                    let stats = l.scheduler().get_stats();
                    format!("{}/{}", stats.invocations, stats.total_frames)
                })
                .collect();
            debug!(
                "Tick {}: counts={:?} detections={:?} fps={:.1} last_tick={}us",
                self.ticks,
                counts,
                detections,
                self.metrics.fps(),
                started.elapsed().as_micros()
            );
        }
    }

    /// Ticks at the configured cadence until shutdown. A slow tick is not
    /// caught up; the next one starts immediately.
    pub fn run(mut self, shutdown: Shutdown) {
        info!(
            "Frame publisher started: {} lanes, tick {:?}",
            self.lanes.len(),
            self.tick_interval
        );

        while !shutdown.is_triggered() {
            let started = Instant::now();
            self.tick();
            if let Some(remaining) = self.tick_interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        info!("Frame publisher stopped after {} ticks", self.ticks);
    }

    pub fn spawn(self, shutdown: Shutdown) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("frame-publisher".to_string())
            .spawn(move || self.run(shutdown))
            .context("Failed to spawn frame publisher thread")
    }
}

/// Counts detector failures into the pipeline metrics.
pub struct CountingDetector<D: Detector> {
    inner: D,
    metrics: PipelineMetrics,
}

impl<D: Detector> CountingDetector<D> {
    pub fn new(inner: D, metrics: PipelineMetrics) -> Self {
        Self { inner, metrics }
    }
}

impl<D: Detector> Detector for CountingDetector<D> {
    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectorError> {
        let result = self.inner.detect(frame, params);
        if result.is_err() {
            self.metrics.inc(&self.metrics.detector_failures);
        }
        result
    }
}
