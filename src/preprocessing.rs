// src/preprocessing.rs

use crate::error::FrameError;
use crate::types::Frame;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};

/// Maps model-input coordinates back onto the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub fn to_rgb_image(frame: &Frame) -> Option<RgbImage> {
    if !frame.is_well_formed() {
        return None;
    }
    RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
}

pub fn from_rgb_image(image: RgbImage, timestamp_ms: f64) -> Frame {
    let (w, h) = image.dimensions();
    Frame::new(image.into_raw(), w as usize, h as usize, timestamp_ms)
}

/// Bilinear resize to the lane's display resolution.
pub fn resize_frame(frame: &Frame, width: u32, height: u32) -> Result<Frame, FrameError> {
    let resize_err = || FrameError::Resize {
        width: frame.width,
        height: frame.height,
    };

    if width == 0 || height == 0 {
        return Err(resize_err());
    }
    let src = to_rgb_image(frame).ok_or_else(resize_err)?;

    if src.dimensions() == (width, height) {
        return Ok(frame.clone());
    }

    let resized = imageops::resize(&src, width, height, FilterType::Triangle);
    Ok(from_rgb_image(resized, frame.timestamp_ms))
}

/// Letterbox into a `size`x`size` gray canvas and convert to a normalized
/// CHW tensor for YOLO.
pub fn letterbox_chw(frame: &Frame, size: usize) -> Result<(Vec<f32>, Letterbox), FrameError> {
    let src = to_rgb_image(frame).ok_or(FrameError::Resize {
        width: frame.width,
        height: frame.height,
    })?;

    let scale = (size as f32 / frame.width as f32).min(size as f32 / frame.height as f32);
    let scaled_w = ((frame.width as f32 * scale) as u32).max(1);
    let scaled_h = ((frame.height as f32 * scale) as u32).max(1);

    let pad_x = (size as u32 - scaled_w) / 2;
    let pad_y = (size as u32 - scaled_h) / 2;

    let resized = imageops::resize(&src, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size as u32, size as u32, Rgb([114, 114, 114]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    // HWC -> CHW, [0, 255] -> [0, 1]
    let plane = size * size;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, pixel) in canvas.pixels().enumerate() {
        for c in 0..3 {
            input[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}
