// src/server/stream.rs
//
// Consumer side of the frame fanout. Every viewer gets its own stream
// that polls the lane's last-value-wins slot at its own pace; it never
// blocks the publisher or other viewers. Frames may repeat or be skipped.

use super::AppState;
use crate::error::FrameError;
use crate::pipeline::StreamGuard;
use crate::preprocessing::to_rgb_image;
use crate::types::{Frame, NUM_LANES};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use std::convert::Infallible;
use std::io::Cursor;
use std::sync::Arc;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const BOUNDARY: &str = "frame";

pub async fn video_feed(State(app): State<AppState>, Path(lane_id): Path<usize>) -> Response {
    if lane_id >= NUM_LANES {
        return (StatusCode::NOT_FOUND, format!("unknown lane {}", lane_id)).into_response();
    }

    info!("📺 Viewer attached to lane {}", lane_id);
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(mjpeg_stream(app, lane_id)),
    )
        .into_response()
}

struct StreamState {
    app: AppState,
    lane: usize,
    ticker: Interval,
    /// Last frame served and its encoded chunk.
    last: Option<(Arc<Frame>, Bytes)>,
    _guard: StreamGuard,
}

pub fn mjpeg_stream(
    app: AppState,
    lane: usize,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let mut ticker = interval(app.stream.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let state = StreamState {
        _guard: StreamGuard::new(app.metrics.clone()),
        app,
        lane,
        ticker,
        last: None,
    };

    futures::stream::unfold(state, |mut st| async move {
        let chunk = next_chunk(&mut st).await?;
        Some((Ok(chunk), st))
    })
}

/// Waits for the next chunk to emit; `None` once shutdown starts.
async fn next_chunk(st: &mut StreamState) -> Option<Bytes> {
    loop {
        if st.app.shutdown.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            _ = st.app.shutdown.wait() => return None,
            _ = st.ticker.tick() => {}
        }

        let Some(frame) = st.app.shared.latest_frame(st.lane) else {
            tokio::select! {
                _ = st.app.shutdown.wait() => return None,
                _ = sleep(st.app.stream.retry_interval) => {}
            }
            continue;
        };

        if let Some((prev, chunk)) = &st.last {
            if Arc::ptr_eq(prev, &frame) {
                return Some(chunk.clone());
            }
        }

        let quality = st.app.stream.jpeg_quality;
        let input = frame.clone();
        match tokio::task::spawn_blocking(move || encode_jpeg(&input, quality)).await {
            Ok(Ok(jpeg)) => {
                let chunk = multipart_chunk(&jpeg);
                st.last = Some((frame, chunk.clone()));
                return Some(chunk);
            }
            Ok(Err(e)) => {
                st.app.metrics.inc(&st.app.metrics.encode_failures);
                debug!("Lane {}: skipping frame ({})", st.lane, e);
            }
            Err(e) => {
                st.app.metrics.inc(&st.app.metrics.encode_failures);
                warn!("Lane {}: encoder task failed: {}", st.lane, e);
            }
        }
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, FrameError> {
    let img = to_rgb_image(frame).ok_or_else(|| {
        FrameError::Encode(format!(
            "{} bytes for {}x{} frame",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    Bytes::from(chunk)
}
