// src/lane_processor.rs
//
// One worker per lane, parameterized by lane id. Each `process` call
// yields at most one annotated frame and a stable vehicle count.
//
// Fallback policy per failure kind:
//   end of stream       → seek to start, retry once
//   read/decode/resize  → no frame this tick, last stable count
//   detector failure    → raw count := previous smoothed value
//   source unavailable  → lane disabled, count 0

use crate::analysis::InferenceScheduler;
use crate::error::{DetectorError, FrameError};
use crate::overlay::draw_overlay;
use crate::preprocessing::resize_frame;
use crate::smoother::CountSmoother;
use crate::types::{Config, Frame, LaneSample};
use crate::vehicle_detection::{filter_detections, DetectParams, Detection, Detector};
use crate::video_processor::VideoSource;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LaneSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub infer_every: u32,
    pub smoothing_alpha: f32,
    pub max_overlay_boxes: usize,
    pub detect: DetectParams,
}

impl LaneSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_width: config.lanes.frame_width,
            frame_height: config.lanes.frame_height,
            infer_every: config.detection.effective_infer_every(),
            smoothing_alpha: config.detection.smoothing_alpha,
            max_overlay_boxes: config.detection.max_overlay_boxes,
            detect: DetectParams {
                confidence_threshold: config.detection.confidence_threshold,
                iou_threshold: config.detection.iou_threshold,
                allowed_classes: config.detection.vehicle_classes.clone(),
            },
        }
    }
}

/// Outcome of one detection attempt.
enum DetectOutcome {
    Fresh(Vec<Detection>),
    Failed(DetectorError),
    Skipped,
}

pub struct LaneProcessor {
    lane_id: usize,
    source: Option<Box<dyn VideoSource>>,
    settings: LaneSettings,
    scheduler: InferenceScheduler,
    smoother: CountSmoother,
    last_boxes: Vec<Detection>,
    last_raw: u32,
    failure_streak: u32,
}

impl LaneProcessor {
    pub fn new(lane_id: usize, source: Box<dyn VideoSource>, settings: LaneSettings) -> Self {
        Self::build(lane_id, Some(source), settings)
    }

    /// A lane whose source could not be opened. Always reports zero.
    pub fn disabled(lane_id: usize, settings: LaneSettings) -> Self {
        Self::build(lane_id, None, settings)
    }

    fn build(
        lane_id: usize,
        source: Option<Box<dyn VideoSource>>,
        settings: LaneSettings,
    ) -> Self {
        Self {
            lane_id,
            source,
            scheduler: InferenceScheduler::new(settings.infer_every),
            smoother: CountSmoother::new(settings.smoothing_alpha),
            settings,
            last_boxes: Vec::new(),
            last_raw: 0,
            failure_streak: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    pub fn stable_count(&self) -> u32 {
        self.smoother.stable_count()
    }

    pub fn scheduler(&self) -> &InferenceScheduler {
        &self.scheduler
    }

    pub fn process(&mut self, detector: &mut dyn Detector) -> LaneSample {
        let frame = match self.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Lane {}: no frame this tick ({})", self.lane_id, e);
                return self.sample(None);
            }
        };

        let mut frame = match resize_frame(
            &frame,
            self.settings.frame_width,
            self.settings.frame_height,
        ) {
            Ok(resized) => resized,
            Err(e) => {
                warn!("Lane {}: {}", self.lane_id, e);
                return self.sample(None);
            }
        };

        match self.detect(&frame, detector) {
            DetectOutcome::Fresh(detections) => {
                if self.failure_streak > 0 {
                    info!(
                        "Lane {}: detector recovered after {} failures",
                        self.lane_id, self.failure_streak
                    );
                    self.failure_streak = 0;
                }
                self.last_raw = detections.len() as u32;
                self.smoother.update(self.last_raw as f32);
                self.last_boxes = detections;
            }
            DetectOutcome::Failed(e) => {
                self.failure_streak += 1;
                if self.failure_streak == 1 {
                    warn!(
                        "Lane {}: {}; holding count at {:.2}",
                        self.lane_id,
                        e,
                        self.smoother.value()
                    );
                } else {
                    debug!("Lane {}: {} (streak {})", self.lane_id, e, self.failure_streak);
                }
                let held = self.smoother.value();
                self.last_raw = held.round() as u32;
                self.smoother.update(held);
            }
            DetectOutcome::Skipped => {}
        }

        draw_overlay(
            &mut frame,
            &self.last_boxes,
            self.smoother.stable_count(),
            self.settings.max_overlay_boxes,
        );

        self.sample(Some(frame))
    }

    /// Reads the next frame, looping to the start once on end of stream.
    fn next_frame(&mut self) -> Result<Frame, FrameError> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| FrameError::Unavailable("lane disabled".to_string()))?;

        if let Some(frame) = source.read()? {
            return Ok(frame);
        }

        debug!("Lane {}: end of stream, rewinding", self.lane_id);
        source.seek_to_start()?;
        source.read()?.ok_or(FrameError::EndOfStream)
    }

    fn detect(&mut self, frame: &Frame, detector: &mut dyn Detector) -> DetectOutcome {
        if !self.scheduler.should_run() {
            return DetectOutcome::Skipped;
        }
        match detector.detect(frame, &self.settings.detect) {
            Ok(detections) => DetectOutcome::Fresh(filter_detections(detections, &self.settings.detect)),
            Err(e) => DetectOutcome::Failed(e),
        }
    }

    fn sample(&self, frame: Option<Frame>) -> LaneSample {
        LaneSample {
            lane_id: self.lane_id,
            raw_count: self.last_raw,
            smoothed_count: self.smoother.value(),
            bounding_boxes: self.last_boxes.clone(),
            frame_index: self.scheduler.frame_counter(),
            frame,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted source: frames whose first byte is their index.
    pub(crate) struct ScriptedSource {
        frames: Vec<Frame>,
        position: usize,
        pub seeks: usize,
        pub fail_seek: bool,
    }

    impl ScriptedSource {
        pub(crate) fn new(count: usize, width: usize, height: usize) -> Self {
            let frames = (0..count)
                .map(|i| {
                    let mut data = vec![0u8; width * height * 3];
                    data[0] = i as u8;
                    Frame::new(data, width, height, i as f64)
                })
                .collect();
            Self {
                frames,
                position: 0,
                seeks: 0,
                fail_seek: false,
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<Frame>, FrameError> {
            let frame = self.frames.get(self.position).cloned();
            if frame.is_some() {
                self.position += 1;
            }
            Ok(frame)
        }

        fn seek_to_start(&mut self) -> Result<(), FrameError> {
            self.seeks += 1;
            if self.fail_seek {
                return Err(FrameError::Read("seek failed".to_string()));
            }
            self.position = 0;
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Returns queued results in order, then repeats the last one.
    pub(crate) struct ScriptedDetector {
        results: VecDeque<Result<usize, ()>>,
        last: Result<usize, ()>,
        pub calls: usize,
    }

    impl ScriptedDetector {
        pub(crate) fn new(results: Vec<Result<usize, ()>>) -> Self {
            Self {
                results: results.into(),
                last: Ok(0),
                calls: 0,
            }
        }

        pub(crate) fn always(n: usize) -> Self {
            Self::new(vec![Ok(n)])
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _params: &DetectParams,
        ) -> Result<Vec<Detection>, DetectorError> {
            self.calls += 1;
            if let Some(next) = self.results.pop_front() {
                self.last = next;
            }
            match self.last {
                Ok(n) => Ok((0..n)
                    .map(|i| {
                        let x = 20.0 + i as f32 * 12.0;
                        Detection::new([x, 60.0, x + 10.0, 70.0], 0.8, 2)
                    })
                    .collect()),
                Err(()) => Err(DetectorError::Inference("scripted failure".to_string())),
            }
        }
    }

    pub(crate) fn settings(infer_every: u32, alpha: f32) -> LaneSettings {
        LaneSettings {
            frame_width: 48,
            frame_height: 36,
            infer_every,
            smoothing_alpha: alpha,
            max_overlay_boxes: 60,
            detect: DetectParams {
                confidence_threshold: 0.25,
                iou_threshold: 0.45,
                allowed_classes: vec![2, 3, 5, 7],
            },
        }
    }

    #[test]
    fn test_counts_and_resizes() {
        let source = ScriptedSource::new(5, 96, 72);
        let mut lane = LaneProcessor::new(0, Box::new(source), settings(1, 1.0));
        let mut detector = ScriptedDetector::always(3);

        let sample = lane.process(&mut detector);
        assert_eq!(sample.raw_count, 3);
        assert_eq!(sample.stable_count(), 3);
        assert_eq!(sample.bounding_boxes.len(), 3);
        let frame = sample.frame.unwrap();
        assert_eq!((frame.width, frame.height), (48, 36));
    }

    #[test]
    fn test_loops_to_first_frame_after_end_of_stream() {
        let source = ScriptedSource::new(2, 48, 36);
        let mut lane = LaneProcessor::new(1, Box::new(source), settings(1, 0.4));
        let mut detector = ScriptedDetector::always(0);

        let first = lane.process(&mut detector).frame.unwrap();
        lane.process(&mut detector).frame.unwrap();
        let looped = lane.process(&mut detector).frame.unwrap();
        assert_eq!(looped.timestamp_ms, first.timestamp_ms);
        assert!(lane.process(&mut detector).frame.is_some());
    }

    #[test]
    fn test_failed_rewind_keeps_last_count() {
        let mut source = ScriptedSource::new(1, 48, 36);
        source.fail_seek = true;
        let mut lane = LaneProcessor::new(0, Box::new(source), settings(1, 1.0));
        let mut detector = ScriptedDetector::always(4);

        assert_eq!(lane.process(&mut detector).stable_count(), 4);
        let sample = lane.process(&mut detector);
        assert!(sample.frame.is_none());
        assert_eq!(sample.stable_count(), 4);
    }

    #[test]
    fn test_detection_throttled() {
        let source = ScriptedSource::new(10, 48, 36);
        let mut lane = LaneProcessor::new(0, Box::new(source), settings(3, 1.0));
        let mut detector = ScriptedDetector::new(vec![Ok(2), Ok(5), Ok(7)]);

        let counts: Vec<u32> = (0..7)
            .map(|_| lane.process(&mut detector).stable_count())
            .collect();
        assert_eq!(detector.calls, 3);
        assert_eq!(counts, vec![2, 2, 2, 5, 5, 5, 7]);
    }

    #[test]
    fn test_boxes_reused_between_detections() {
        let source = ScriptedSource::new(10, 48, 36);
        let mut lane = LaneProcessor::new(0, Box::new(source), settings(4, 1.0));
        let mut detector = ScriptedDetector::always(2);

        let first = lane.process(&mut detector);
        let second = lane.process(&mut detector);
        assert_eq!(detector.calls, 1);
        assert_eq!(first.bounding_boxes, second.bounding_boxes);
        assert_eq!(second.frame_index, 2);
    }

    #[test]
    fn test_smoothing_applied() {
        let source = ScriptedSource::new(10, 48, 36);
        let mut lane = LaneProcessor::new(0, Box::new(source), settings(1, 0.4));
        let mut detector = ScriptedDetector::always(10);

        // 0 -> 4.0 -> 6.4
        assert_eq!(lane.process(&mut detector).stable_count(), 4);
        let sample = lane.process(&mut detector);
        assert!((sample.smoothed_count - 6.4).abs() < 1e-4);
        assert_eq!(sample.stable_count(), 6);
    }

    #[test]
    fn test_failing_detector_pins_count() {
        let source = ScriptedSource::new(10, 48, 36);
        let mut lane = LaneProcessor::new(2, Box::new(source), settings(1, 0.4));
        let mut detector = ScriptedDetector::new(vec![Ok(10), Ok(10), Err(())]);

        lane.process(&mut detector);
        let pinned = lane.process(&mut detector).smoothed_count;
        for _ in 0..20 {
            let sample = lane.process(&mut detector);
            assert!((sample.smoothed_count - pinned).abs() < 1e-4);
            assert!(sample.frame.is_some());
        }
        assert_eq!(lane.stable_count(), 6);
    }

    #[test]
    fn test_disabled_lane_reports_zero() {
        let mut lane = LaneProcessor::disabled(3, settings(1, 0.4));
        let mut detector = ScriptedDetector::always(9);
        let sample = lane.process(&mut detector);
        assert!(!lane.is_enabled());
        assert!(sample.frame.is_none());
        assert_eq!(sample.stable_count(), 0);
        assert_eq!(detector.calls, 0);
    }
}
