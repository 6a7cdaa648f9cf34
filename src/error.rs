// src/error.rs
//
// Recoverable per-tick failures. Each kind maps to one fallback in
// LaneProcessor or the stream fanout; none of them reach HTTP clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("end of stream")]
    EndOfStream,
    #[error("video source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("failed to decode frame {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("failed to resize {width}x{height} frame")]
    Resize { width: usize, height: usize },
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("malformed detector output: {0}")]
    Malformed(String),
}
