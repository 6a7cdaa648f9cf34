// src/main.rs

mod analysis;
mod config;
mod error;
mod lane_processor;
mod overlay;
mod pipeline;
mod preprocessing;
mod server;
mod smoother;
mod types;
mod vehicle_detection;
mod video_processor;

use anyhow::{anyhow, bail, Result};
use lane_processor::{LaneProcessor, LaneSettings};
use pipeline::{
    spawn_analytics_recorder, spawn_signal_scheduler, CountingDetector, FramePublisher,
    PipelineMetrics, SharedState, Shutdown,
};
use server::{AppState, StreamSettings};
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::{Config, NUM_LANES};
use vehicle_detection::Detector;

const CONFIG_ENV: &str = "TRAFFIC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let (mut config, origin) = Config::load_or_default(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "traffic_signal_control={},ort=warn",
            config.logging.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Traffic Signal Control Starting");
    origin.log(&config_path);

    config.apply_env_overrides();
    config.validate()?;
    info!(
        "Detection: fast_mode={}, infer_every={}, alpha={:.2}, analytics_points={}",
        config.detection.fast_mode,
        config.detection.effective_infer_every(),
        config.detection.smoothing_alpha,
        config.analytics.max_points
    );

    let metrics = PipelineMetrics::new();
    let lanes = open_lanes(&config)?;
    let detector = build_detector(&config, &metrics)?;

    let shared = SharedState::handle(config.analytics.max_points);
    let shutdown = Shutdown::new();

    let publisher = FramePublisher::new(
        lanes,
        detector,
        shared.clone(),
        metrics.clone(),
        Duration::from_millis(config.pipeline.tick_interval_ms),
    );
    let publisher_handle = publisher.spawn(shutdown.clone())?;

    let scheduler_handle = spawn_signal_scheduler(shared.clone(), shutdown.clone());
    let recorder_handle = spawn_analytics_recorder(
        shared.clone(),
        Duration::from_secs(config.analytics.interval_secs),
        shutdown.clone(),
    );

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_shutdown.trigger();
    });

    let state = AppState {
        shared,
        metrics: metrics.clone(),
        shutdown: shutdown.clone(),
        stream: StreamSettings::from_config(&config),
    };
    let served = server::serve(&config.server, state).await;

    // Bind failures land here before any signal; stop the workers either way.
    shutdown.trigger();
    report_join("Signal scheduler", scheduler_handle.await);
    report_join("Analytics recorder", recorder_handle.await);
    tokio::task::spawn_blocking(move || publisher_handle.join())
        .await?
        .map_err(|_| anyhow!("frame publisher thread panicked"))?;

    let summary = metrics.summary();
    info!(
        "✓ Stopped after {} ticks ({:.1} fps), {} detector runs, {} detector failures",
        summary.total_ticks, summary.fps, summary.detector_runs, summary.detector_failures
    );

    served
}

/// Logs a background task that ended by panic or cancellation.
fn report_join(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", task, e);
            false
        }
    }
}

/// Opens every configured lane. A lane that fails stays in the rotation
/// with a zero count; startup only fails when none open.
fn open_lanes(config: &Config) -> Result<Vec<LaneProcessor>> {
    let settings = LaneSettings::from_config(config);
    let mut lanes = Vec::with_capacity(NUM_LANES);

    for (lane_id, path) in config.lanes.sources.iter().enumerate().take(NUM_LANES) {
        match video_processor::open_lane_source(path) {
            Ok(source) => {
                info!("✓ Lane {}: {}", lane_id, source.describe());
                lanes.push(LaneProcessor::new(lane_id, source, settings.clone()));
            }
            Err(e) => {
                error!("Lane {}: cannot open {}: {}", lane_id, path, e);
                lanes.push(LaneProcessor::disabled(lane_id, settings.clone()));
            }
        }
    }

    if !lanes.iter().any(|l| l.is_enabled()) {
        bail!("No lane source could be opened");
    }
    Ok(lanes)
}

#[cfg(feature = "onnx")]
fn build_detector(config: &Config, metrics: &PipelineMetrics) -> Result<Box<dyn Detector>> {
    let detector = vehicle_detection::YoloDetector::new(
        &config.detection.model_path,
        config.detection.use_cuda,
    )?;
    info!("✓ Detector loaded from {}", config.detection.model_path);
    Ok(Box::new(CountingDetector::new(detector, metrics.clone())))
}

#[cfg(not(feature = "onnx"))]
fn build_detector(_config: &Config, metrics: &PipelineMetrics) -> Result<Box<dyn Detector>> {
    tracing::warn!("Built without the `onnx` feature; every lane will report 0 vehicles");
    let detector = vehicle_detection::UnavailableDetector::new("built without the `onnx` feature");
    Ok(Box::new(CountingDetector::new(detector, metrics.clone())))
}
