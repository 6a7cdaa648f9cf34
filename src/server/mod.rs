// src/server/mod.rs

pub mod dashboard;
pub mod routes;
pub mod stream;

use crate::pipeline::{PipelineMetrics, SharedHandle, Shutdown};
use crate::types::{Config, ServerConfig};
use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Pacing for MJPEG consumers.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub frame_interval: Duration,
    pub retry_interval: Duration,
    pub jpeg_quality: u8,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_interval: Duration::from_millis(config.pipeline.tick_interval_ms.max(1)),
            retry_interval: Duration::from_millis(config.pipeline.stream_retry_ms.max(1)),
            jpeg_quality: config.pipeline.jpeg_quality,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedHandle,
    pub metrics: PipelineMetrics,
    pub shutdown: Shutdown,
    pub stream: StreamSettings,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/traffic_data", get(routes::traffic_data))
        .route("/analytics_data", get(routes::analytics_data))
        .route("/metrics", get(routes::metrics))
        .route("/video_feed/:lane_id", get(stream::video_feed))
        .with_state(state)
}

/// Serves until the shutdown signal fires. Open MJPEG streams end on the
/// same signal, so graceful shutdown does not hang on them.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Dashboard listening on http://{}", addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::SharedState;

    pub(crate) fn app_state() -> AppState {
        AppState {
            shared: SharedState::handle(10),
            metrics: PipelineMetrics::new(),
            shutdown: Shutdown::new(),
            stream: StreamSettings {
                frame_interval: Duration::from_millis(5),
                retry_interval: Duration::from_millis(5),
                jpeg_quality: 72,
            },
        }
    }

    #[test]
    fn test_stream_settings_from_config() {
        let mut config = Config::default();
        config.pipeline.tick_interval_ms = 0;
        config.pipeline.jpeg_quality = 90;

        let settings = StreamSettings::from_config(&config);
        assert_eq!(settings.frame_interval, Duration::from_millis(1));
        assert_eq!(settings.jpeg_quality, 90);
    }
}
