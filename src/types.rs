// src/types.rs

use crate::vehicle_detection::Detection;
use serde::{Deserialize, Serialize};

/// Number of monitored approaches at the intersection.
pub const NUM_LANES: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub lanes: LanesConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    /// One video file or image-sequence directory per lane, in lane order.
    pub sources: Vec<String>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            sources: (1..=NUM_LANES)
                .map(|i| format!("Video/lane{}.mp4", i))
                .collect(),
            frame_width: 480,
            frame_height: 360,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: String,
    pub use_cuda: bool,
    pub fast_mode: bool,
    /// Explicit throttle. When unset, `fast_mode` picks the default.
    pub infer_every: Option<u32>,
    pub smoothing_alpha: f32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub vehicle_classes: Vec<usize>,
    pub max_overlay_boxes: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "yolov8n.onnx".to_string(),
            use_cuda: false,
            fast_mode: false,
            infer_every: None,
            smoothing_alpha: 0.4,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            vehicle_classes: vec![2, 3, 5, 7], // car, motorcycle, bus, truck
            max_overlay_boxes: 60,
        }
    }
}

impl DetectionConfig {
    pub const NORMAL_INFER_EVERY: u32 = 3;
    pub const FAST_INFER_EVERY: u32 = 8;

    pub fn effective_infer_every(&self) -> u32 {
        match self.infer_every {
            Some(n) => n,
            None if self.fast_mode => Self::FAST_INFER_EVERY,
            None => Self::NORMAL_INFER_EVERY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tick_interval_ms: u64,
    pub jpeg_quality: u8,
    pub stream_retry_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30,
            jpeg_quality: 72,
            stream_retry_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub interval_secs: u64,
    pub max_points: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            max_points: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Packed RGB8 image.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width * self.height * 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Light {
    Red,
    Green,
}

impl Light {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Green => "GREEN",
        }
    }
}

/// Result of one processing tick for one lane. Owned by the processing
/// loop until it is published into shared state.
#[derive(Debug, Clone)]
pub struct LaneSample {
    pub lane_id: usize,
    pub raw_count: u32,
    pub smoothed_count: f32,
    pub bounding_boxes: Vec<Detection>,
    pub frame_index: u64,
    pub frame: Option<Frame>,
}

impl LaneSample {
    /// The count reported to the rest of the system.
    pub fn stable_count(&self) -> u32 {
        self.smoothed_count.max(0.0).round() as u32
    }
}
