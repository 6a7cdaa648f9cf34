// src/vehicle_detection.rs

use crate::error::DetectorError;
use crate::preprocessing::Letterbox;
use crate::types::Frame;
use tracing::debug;

pub const YOLO_INPUT_SIZE: usize = 640;
pub const YOLO_CLASSES: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in frame coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_id_to_name(class_id),
        }
    }

    /// Finite coordinates, finite confidence and a non-inverted box.
    pub fn is_well_formed(&self) -> bool {
        let [x1, y1, x2, y2] = self.bbox;
        self.bbox.iter().all(|v| v.is_finite())
            && self.confidence.is_finite()
            && x2 >= x1
            && y2 >= y1
    }
}

#[derive(Debug, Clone)]
pub struct DetectParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub allowed_classes: Vec<usize>,
}

impl DetectParams {
    pub fn allows(&self, class_id: usize) -> bool {
        self.allowed_classes.contains(&class_id)
    }
}

/// Black-box localizer. Called sequentially from the processing loop only,
/// so implementations need not be safe for concurrent use.
pub trait Detector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectParams,
    ) -> Result<Vec<Detection>, DetectorError>;
}

/// Stand-in used when no inference backend is compiled in.
pub struct UnavailableDetector {
    reason: String,
}

impl UnavailableDetector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Detector for UnavailableDetector {
    fn detect(&mut self, _: &Frame, _: &DetectParams) -> Result<Vec<Detection>, DetectorError> {
        Err(DetectorError::Unavailable(self.reason.clone()))
    }
}

/// Drops malformed boxes and classes outside the allowed set.
pub fn filter_detections(detections: Vec<Detection>, params: &DetectParams) -> Vec<Detection> {
    let before = detections.len();
    let kept: Vec<Detection> = detections
        .into_iter()
        .filter(|d| d.is_well_formed() && params.allows(d.class_id))
        .collect();

    if kept.len() < before {
        debug!("Filtered {} of {} detections", before - kept.len(), before);
    }
    kept
}

/// Decodes a YOLOv8 output tensor laid out as `[4 + classes, predictions]`
/// (center-format boxes followed by per-class scores).
pub fn decode_yolo_output(
    output: &[f32],
    letterbox: &Letterbox,
    params: &DetectParams,
) -> Result<Vec<Detection>, DetectorError> {
    let rows = 4 + YOLO_CLASSES;
    if output.is_empty() || output.len() % rows != 0 {
        return Err(DetectorError::Malformed(format!(
            "output length {} is not a multiple of {}",
            output.len(),
            rows
        )));
    }
    let n = output.len() / rows;

    let mut detections = Vec::new();

    for i in 0..n {
        let cx = output[i];
        let cy = output[n + i];
        let w = output[n * 2 + i];
        let h = output[n * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..YOLO_CLASSES {
            let conf = output[n * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < params.confidence_threshold || !params.allows(best_class) {
            continue;
        }

        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        detections.push(Detection::new([x1, y1, x2, y2], max_conf, best_class));
    }

    Ok(nms(detections, params.iou_threshold))
}

pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep
            .iter()
            .all(|k| calculate_iou(&k.bbox, &det.bbox) < iou_threshold)
        {
            keep.push(det);
        }
    }

    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

pub fn class_id_to_name(class_id: usize) -> String {
    match class_id {
        1 => "bicycle",
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        7 => "truck",
        _ => "unknown",
    }
    .to_string()
}

#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

#[cfg(feature = "onnx")]
mod yolo {
    use super::*;
    use crate::preprocessing::letterbox_chw;
    use anyhow::{Context, Result};
    use ort::{
        execution_providers::CUDAExecutionProvider,
        session::{builder::GraphOptimizationLevel, Session},
    };
    use tracing::info;

    pub struct YoloDetector {
        session: Session,
    }

    impl YoloDetector {
        pub fn new(model_path: &str, use_cuda: bool) -> Result<Self> {
            info!("Loading YOLO model: {}", model_path);

            let mut builder = Session::builder()?;
            if use_cuda {
                info!("Enabling CUDA execution provider");
                builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])?;
            }

            let session = builder
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(4)?
                .commit_from_file(model_path)
                .with_context(|| format!("Failed to load model {}", model_path))?;

            info!("✓ YOLO detector initialized");
            Ok(Self { session })
        }

        fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>, DetectorError> {
            let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
            let input_value =
                ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))
                    .map_err(|e| DetectorError::Inference(e.to_string()))?;

            let outputs = self
                .session
                .run(ort::inputs!["images" => input_value])
                .map_err(|e| DetectorError::Inference(e.to_string()))?;

            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Malformed(e.to_string()))?;

            Ok(data.to_vec())
        }
    }

    impl Detector for YoloDetector {
        fn detect(
            &mut self,
            frame: &Frame,
            params: &DetectParams,
        ) -> Result<Vec<Detection>, DetectorError> {
            let (input, letterbox) = letterbox_chw(frame, YOLO_INPUT_SIZE)
                .map_err(|e| DetectorError::Inference(e.to_string()))?;
            let output = self.infer(input)?;
            let detections = decode_yolo_output(&output, &letterbox, params)?;
            debug!("Detected {} vehicles", detections.len());
            Ok(detections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DetectParams {
        DetectParams {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            allowed_classes: vec![2, 3, 5, 7],
        }
    }

    fn identity() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        }
    }

    /// Builds a `[84, n]` tensor from (cx, cy, w, h, class, score) rows.
    fn tensor(preds: &[(f32, f32, f32, f32, usize, f32)]) -> Vec<f32> {
        let n = preds.len();
        let mut out = vec![0.0; (4 + YOLO_CLASSES) * n];
        for (i, &(cx, cy, w, h, class, score)) in preds.iter().enumerate() {
            out[i] = cx;
            out[n + i] = cy;
            out[2 * n + i] = w;
            out[3 * n + i] = h;
            out[(4 + class) * n + i] = score;
        }
        out
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let dets = vec![
            Detection::new([0.0, 0.0, 10.0, 10.0], 0.6, 2),
            Detection::new([1.0, 1.0, 11.0, 11.0], 0.9, 2),
            Detection::new([50.0, 50.0, 60.0, 60.0], 0.5, 7),
        ];
        let kept = nms(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 7);
    }

    #[test]
    fn test_decode_filters_classes_and_confidence() {
        let output = tensor(&[
            (50.0, 50.0, 20.0, 20.0, 2, 0.9),   // car
            (150.0, 50.0, 20.0, 20.0, 0, 0.95), // person
            (250.0, 50.0, 20.0, 20.0, 7, 0.1),  // truck below threshold
            (350.0, 50.0, 20.0, 20.0, 5, 0.5),  // bus
        ]);
        let dets = decode_yolo_output(&output, &identity(), &params()).unwrap();
        assert_eq!(dets.len(), 2);
        assert!(dets.iter().all(|d| d.class_id == 2 || d.class_id == 5));
        let car = dets.iter().find(|d| d.class_id == 2).unwrap();
        assert_eq!(car.bbox, [40.0, 40.0, 60.0, 60.0]);
        assert_eq!(car.class_name, "car");
    }

    #[test]
    fn test_decode_maps_through_letterbox() {
        let output = tensor(&[(320.0, 320.0, 100.0, 100.0, 2, 0.8)]);
        let letterbox = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        let dets = decode_yolo_output(&output, &letterbox, &params()).unwrap();
        assert_eq!(dets[0].bbox, [135.0, 95.0, 185.0, 145.0]);
    }

    #[test]
    fn test_decode_rejects_truncated_output() {
        let err = decode_yolo_output(&[0.0; 85], &identity(), &params()).unwrap_err();
        assert!(matches!(err, DetectorError::Malformed(_)));
    }

    #[test]
    fn test_filter_drops_malformed_and_disallowed() {
        let dets = vec![
            Detection::new([0.0, 0.0, 10.0, 10.0], 0.9, 2),
            Detection::new([f32::NAN, 0.0, 10.0, 10.0], 0.9, 2),
            Detection::new([10.0, 0.0, 0.0, 10.0], 0.9, 3),
            Detection::new([0.0, 0.0, 10.0, 10.0], 0.9, 0),
        ];
        let kept = filter_detections(dets, &params());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_unavailable_detector_always_fails() {
        let mut detector = UnavailableDetector::new("no backend");
        let frame = Frame::new(vec![0; 12], 2, 2, 0.0);
        assert!(matches!(
            detector.detect(&frame, &params()),
            Err(DetectorError::Unavailable(_))
        ));
    }
}
